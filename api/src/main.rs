mod app;
mod dto;
mod handlers;
mod lifecycle;
mod middleware;
mod state;
mod sync_waiters;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lifecycle::run().await
}
