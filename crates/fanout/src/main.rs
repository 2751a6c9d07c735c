#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fanout::run().await
}
