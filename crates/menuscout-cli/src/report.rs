//! Read-only `stats` and `search` commands.

use clap::Subcommand;
use menuscout_db::Database;
use rust_decimal::Decimal;

#[derive(Debug, Subcommand)]
pub enum SearchCommands {
    /// Restaurants whose name contains QUERY, best rated first
    Restaurants {
        query: String,
        /// Only restaurants in this city
        #[arg(long)]
        city: Option<String>,
        /// Only restaurants in this category slug
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Available products whose name contains QUERY
    Products {
        query: String,
        #[arg(long)]
        min_price: Option<Decimal>,
        #[arg(long)]
        max_price: Option<Decimal>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

fn fmt_decimal(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |d| d.to_string())
}

pub(crate) async fn run_stats(db: &Database) -> anyhow::Result<()> {
    let stats = menuscout_db::database_statistics(db).await?;
    println!("categories:            {}", stats.total_categories);
    println!("active restaurants:    {}", stats.active_restaurants);
    println!("available products:    {}", stats.available_products);
    println!("price changes (7 days): {}", stats.price_changes_last_7_days);
    if !stats.restaurants_by_category.is_empty() {
        println!("restaurants by category:");
        for row in &stats.restaurants_by_category {
            println!("  {:<20} {:>6}  {}", row.slug, row.restaurants, row.name);
        }
    }
    Ok(())
}

pub(crate) async fn run_search(db: &Database, command: SearchCommands) -> anyhow::Result<()> {
    match command {
        SearchCommands::Restaurants {
            query,
            city,
            category,
            limit,
        } => {
            let hits = menuscout_db::search_restaurants(
                db,
                &query,
                city.as_deref(),
                category.as_deref(),
                limit,
            )
            .await?;
            if hits.is_empty() {
                println!("no restaurants match '{query}'");
            }
            for hit in hits {
                println!(
                    "{:<40} {:<14} rating {:<4} fee {:<7} {}",
                    hit.name,
                    hit.category_slug,
                    fmt_decimal(hit.rating),
                    fmt_decimal(hit.delivery_fee),
                    hit.delivery_time.as_deref().unwrap_or("-")
                );
            }
        }
        SearchCommands::Products {
            query,
            min_price,
            max_price,
            limit,
        } => {
            let hits =
                menuscout_db::search_products(db, &query, min_price, max_price, limit).await?;
            if hits.is_empty() {
                println!("no products match '{query}'");
            }
            for hit in hits {
                println!(
                    "{:<40} R$ {:<8} {:<16} {} ({})",
                    hit.name,
                    fmt_decimal(hit.price),
                    hit.section,
                    hit.restaurant_name,
                    fmt_decimal(hit.restaurant_rating)
                );
            }
        }
    }
    Ok(())
}
