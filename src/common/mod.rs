pub mod errors;
pub mod utils;

pub const BUCKET_NAME_DEFAULT: &str = "attendance-uploads";
pub const TABLE_NAME_DEFAULT: &str = "AttendanceLogs";
pub const PROFILE_TABLE_NAME_DEFAULT: &str = "EmployeeProfiles";

/// Installs the fmt subscriber shared by every lambda in this crate.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .without_time() // CloudWatch will add the ingestion time
        .with_target(false)
        .init();
}
