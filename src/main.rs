use hemmer_provider_azurerm_mysql::{init_logging, serve, AzureMySqlProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    serve(AzureMySqlProvider::new()).await
}
