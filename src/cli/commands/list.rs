//! List command implementation
//!
//! This module implements the `list` command, which prints the items of a
//! collection as `id => name`, or the tree of collections below it.

use crate::adapters::{InstanceClient, InstanceResult, ListedEntity, MetabaseClient, RootFilter};
use crate::config::load_config;
use crate::domain::{EntityId, EntityKind};
use clap::{Args, ValueEnum};
use std::collections::HashSet;

/// Item kinds the list command can show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    #[default]
    Dashboards,
    Questions,
    All,
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Collection to list
    #[arg(long, value_name = "ID")]
    pub collection: u64,

    /// Item kind to show
    #[arg(long, value_enum, default_value_t = ListKind::Dashboards)]
    pub kind: ListKind,

    /// List the destination instance instead of the source
    #[arg(long)]
    pub destination: bool,

    /// Print every collection below --collection as an indented tree
    #[arg(long, conflicts_with = "kind")]
    pub tree: bool,
}

/// One collection of a collection tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Nesting below the listed collection, starting at 0
    pub depth: usize,
    pub collection: ListedEntity,
}

/// Collections below `top`, depth first, each followed by its own subcollections
///
/// # Errors
///
/// Returns the first listing error.
pub async fn collection_tree(
    client: &dyn InstanceClient,
    top: EntityId,
) -> InstanceResult<Vec<TreeEntry>> {
    let mut tree = Vec::new();
    let mut visited = HashSet::from([top]);
    let mut stack = subcollections(client, top, 0).await?;

    while let Some(entry) = stack.pop() {
        let id = entry.collection.reference.id;
        let depth = entry.depth;
        tree.push(entry);
        if visited.insert(id) {
            stack.extend(subcollections(client, id, depth + 1).await?);
        }
    }
    Ok(tree)
}

/// Direct subcollections, reversed so popping yields them in listing order
async fn subcollections(
    client: &dyn InstanceClient,
    parent: EntityId,
    depth: usize,
) -> InstanceResult<Vec<TreeEntry>> {
    let items = client.list_items(RootFilter::CollectionItems(parent)).await?;
    Ok(items
        .into_iter()
        .filter(|item| item.reference.kind == EntityKind::Collection)
        .rev()
        .map(|collection| TreeEntry { depth, collection })
        .collect())
}

impl ListArgs {
    fn filter(&self) -> Result<RootFilter, String> {
        let id = EntityId::new(self.collection)?;
        Ok(match self.kind {
            ListKind::Dashboards => RootFilter::DashboardsInCollection(id),
            ListKind::Questions => RootFilter::QuestionsInCollection(id),
            ListKind::All => RootFilter::CollectionItems(id),
        })
    }

    /// Execute the list command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let filter = match self.filter() {
            Ok(f) => f,
            Err(e) => {
                println!("❌ Invalid collection: {e}");
                return Ok(2);
            }
        };

        let instance = if self.destination {
            &config.destination
        } else {
            &config.source
        };
        tracing::info!(instance = %instance.base_url, filter = %filter, "Listing items");

        let client = match MetabaseClient::new(instance) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to create client for {}", instance.base_url);
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        if self.tree {
            let top = filter.collection();
            let tree = match collection_tree(&client, top).await {
                Ok(tree) => tree,
                Err(e) => {
                    println!("❌ Failed to list collections below {top}");
                    println!("   Error: {e}");
                    return Ok(4);
                }
            };
            println!("{top}");
            for entry in tree {
                println!(
                    "{}└─ {} => {}",
                    "   ".repeat(entry.depth),
                    entry.collection.reference.id,
                    entry.collection.name
                );
            }
            return Ok(0);
        }

        let items = match client.list_items(filter).await {
            Ok(items) => items,
            Err(e) => {
                println!("❌ Failed to list {filter}");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        if items.is_empty() {
            println!("No {filter}.");
            return Ok(0);
        }
        for item in items {
            match self.kind {
                ListKind::All => println!("{} => {}", item.reference, item.name),
                _ => println!("{} => {}", item.reference.id, item.name),
            }
        }
        Ok(0)
    }
}
