//! Transaction example for the graph REST client

use graph_rest_client::*;

#[tokio::main]
async fn main() -> Result<()> {
    let client = CypherClient::with_config(ClientConfig::from_env())?;
    client.connect().await?;

    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("   {}", event);
        }
    });

    println!("=== Transaction Example ===\n");

    println!("1. Creating two people and a relationship in one transaction...");
    client
        .with_transaction(|client, scope| {
            Box::pin(async move {
                client
                    .execute(
                        &Statement::new("CREATE (n:Person {name: $name})").param("name", "Alice"),
                        Some(scope),
                    )
                    .await?;
                client
                    .execute(
                        &Statement::new("CREATE (n:Person {name: $name})").param("name", "Bob"),
                        Some(scope),
                    )
                    .await?;
                client
                    .execute(
                        &Statement::new(
                            "MATCH (a:Person {name: 'Alice'}), (b:Person {name: 'Bob'}) CREATE (a)-[:KNOWS {since: 2020}]->(b)",
                        ),
                        Some(scope),
                    )
                    .await?;
                Ok(())
            })
        })
        .await?;
    println!("   Transaction committed");

    println!("\n2. Running a statement and then abandoning the transaction...");
    let scope = TransactionScope::new();
    client
        .execute(&Statement::new("CREATE (n:Person {name: 'Mallory'})"), Some(&scope))
        .await?;
    println!("   Open transactions: {}", client.active_transaction_count());
    scope.finish().await?;
    println!("   Rolled back, open transactions: {}", client.active_transaction_count());

    println!("\n3. Reading back...");
    let names: Vec<String> = client
        .query(&Statement::new("MATCH (n:Person) RETURN n.name"), None)
        .await?;
    println!("   People: {:?}", names);

    println!("\n=== Example completed ===");
    Ok(())
}
