mod control;
mod host;
mod pwm;
#[cfg(test)]
mod testutil;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
