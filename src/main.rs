#[tokio::main]
async fn main() -> anyhow::Result<()> {
    camera_recorder_lib::run().await
}
