use face_attendance::common::init_tracing;
use face_attendance::config::Mode;
use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    face_attendance::trigger::run(Mode::Attendance).await
}
