use ecomarket_http::{DeleteOutcome, EcoMarketClient, NewProduct};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let api = EcoMarketClient::from_env().map_err(anyhow::Error::msg)?;

    for product in api.list_products().await? {
        println!("{:>4}  {:<30} ${:.2}", product.id, product.nombre, product.precio);
    }

    let created = api
        .create_product(&NewProduct::new("Detergente Biodegradable", 85.5).with_categoria("Limpieza"))
        .await?;
    println!("created product {}", created.id);

    match api.delete_producer(5).await? {
        DeleteOutcome::Deleted => println!("producer 5 deleted"),
        DeleteOutcome::Blocked(details) => {
            println!("cannot delete producer 5: {}", details.message);
            if let Some(action) = details.action {
                println!("suggested action: {action}");
            }
        }
    }

    Ok(())
}
