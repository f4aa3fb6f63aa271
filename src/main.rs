#[tokio::main]
async fn main() {
    vouchers::start_server().await;
}
