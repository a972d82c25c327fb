use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use restodir::api::ApiClient;
use restodir::cache::{CacheStorage, MemoryStorage, SqliteStorage};
use restodir::config::Config;
use restodir::directory::{Restaurant, RestaurantDirectory, Review};
use restodir::logging;

#[derive(Parser, Debug)]
#[command(name = "restodir")]
#[command(about = "Offline-first restaurant directory")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/restodir/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Restaurant service base URL
  #[arg(long)]
  api_url: Option<String>,

  /// Keep the cache in memory for this run only
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List restaurants, optionally filtered
  List {
    #[arg(long, default_value = "all")]
    cuisine: String,
    #[arg(long, default_value = "all")]
    neighborhood: String,
  },
  /// Show one restaurant
  Show { id: String },
  /// List distinct neighborhoods
  Neighborhoods,
  /// List distinct cuisines
  Cuisines,
  /// Show the reviews of a restaurant
  Reviews { id: String },
  /// Add a review; it is pushed now or on a later sync
  Review {
    id: String,
    #[arg(long)]
    name: String,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    rating: u8,
    #[arg(long)]
    comments: String,
  },
  /// Push reviews that have not reached the service yet
  Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url.clone() {
    config.api.base_url = url;
  }

  let _guard = logging::init(&config.logging);

  let api = ApiClient::new(&config.api)
    .map_err(|e| eyre!("Failed to create API client for {}: {}", config.api.base_url, e))?;

  if args.ephemeral {
    run(args.command, Arc::new(MemoryStorage::new()), api).await
  } else {
    let storage = match &config.store.path {
      Some(path) => SqliteStorage::open(path)?,
      None => SqliteStorage::open_default()?,
    };
    run(args.command, Arc::new(storage), api).await
  }
}

async fn run<S: CacheStorage>(command: Command, storage: Arc<S>, api: ApiClient) -> Result<()> {
  let directory = RestaurantDirectory::new(storage, api);

  match command {
    Command::List {
      cuisine,
      neighborhood,
    } => {
      let restaurants = directory
        .restaurants_by_cuisine_and_neighborhood(cuisine.as_str(), neighborhood.as_str())
        .await?;
      for restaurant in &restaurants {
        print_summary(restaurant);
      }
    }
    Command::Show { id } => {
      let restaurant = directory.restaurant_by_id(&id).await?;
      println!("{}", serde_json::to_string_pretty(&restaurant)?);
    }
    Command::Neighborhoods => {
      for neighborhood in directory.neighborhoods().await? {
        println!("{}", neighborhood);
      }
    }
    Command::Cuisines => {
      for cuisine in directory.cuisines().await? {
        println!("{}", cuisine);
      }
    }
    Command::Reviews { id } => {
      for review in directory.reviews_by_id(&id).await? {
        print_review(&review);
      }
    }
    Command::Review {
      id,
      name,
      rating,
      comments,
    } => {
      directory
        .add_review(&id, Review::pending(name, rating, comments))
        .await?;
      let restaurant = directory.restaurant_by_id(&id).await?;
      let pending = restaurant.pending_reviews().count();
      if pending == 0 {
        println!("Review saved and synced");
      } else {
        println!("Review saved; {} review(s) waiting to sync", pending);
      }
    }
    Command::Sync => {
      let report = directory.review_sync().sync_unsynced().await?;
      println!(
        "pushed {}, failed {}, restaurants updated {}",
        report.pushed, report.failed, report.restaurants_updated
      );
    }
  }

  Ok(())
}

fn print_summary(restaurant: &Restaurant) {
  println!(
    "{:>4}  {:<32} {:<16} {}",
    restaurant.id.0,
    restaurant.name.as_deref().unwrap_or("-"),
    restaurant.cuisine_type.as_deref().unwrap_or("-"),
    restaurant.neighborhood.as_deref().unwrap_or("-")
  );
}

fn print_review(review: &Review) {
  let status = if review.is_pending() { " (not synced)" } else { "" };
  println!(
    "{} - {}/5 - {}{}",
    review.name,
    review.rating,
    review.date.as_deref().unwrap_or("undated"),
    status
  );
  println!("  {}", review.comments);
}
