//! Operator subcommands: allow-list, block-list, indexer-data
//!
//! These run against the same pin namespace as the node; the reconciler
//! picks up policy changes on its next cycle.

use std::sync::Arc;

use anyhow::bail;
use once_cell::sync::Lazy;
use regex::Regex;

use spage_chain::Address;
use spage_core::{contenthash_set, ListRegistry, ListValue, DOMAINS_SET, RESOLVERS_SET};
use spage_store::PageStore;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]+\.eth$").expect("static pattern"));

/// Whether a name is acceptable operator input
pub fn valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Action on the allow or block set
#[derive(Clone, Debug)]
pub enum ListAction {
    Show,
    Add(String),
    Rm(String),
}

/// Run an allow-list or block-list subcommand against `set`
pub async fn run_list_command<S: PageStore>(
    store: Arc<S>,
    set: &str,
    action: ListAction,
) -> anyhow::Result<()> {
    let lists = ListRegistry::new(store);
    match action {
        ListAction::Show => {
            for name in lists.strings(set).await? {
                println!("{name}");
            }
        }
        ListAction::Add(name) => {
            if !valid_name(&name) {
                bail!("invalid name: {name} (expected <label>.eth, lowercase)");
            }
            lists.add(set, &ListValue::Str(name)).await?;
        }
        ListAction::Rm(name) => {
            if !valid_name(&name) {
                bail!("invalid name: {name} (expected <label>.eth, lowercase)");
            }
            lists.remove(set, &ListValue::Str(name)).await?;
        }
    }
    Ok(())
}

/// Action on the indexer's discovery state
#[derive(Clone, Copy, Debug)]
pub enum DataAction {
    Show,
    Reset,
}

/// Dump or wipe the `domains`, `resolvers`, and all `contenthash_*` sets
pub async fn run_indexer_data<S: PageStore>(store: Arc<S>, action: DataAction) -> anyhow::Result<()> {
    let lists = ListRegistry::new(store);
    let domains = lists.strings(DOMAINS_SET).await?;

    match action {
        DataAction::Show => {
            println!("domains:");
            for name in &domains {
                println!("  {name}");
            }
            println!("resolvers:");
            for raw in lists.addresses(RESOLVERS_SET).await? {
                println!("  {}", Address(raw));
            }
            for name in &domains {
                let entries = lists.strings(&contenthash_set(name)).await?;
                if entries.is_empty() {
                    continue;
                }
                println!("contenthash_{name}:");
                for entry in entries {
                    println!("  {entry}");
                }
            }
        }
        DataAction::Reset => {
            for name in &domains {
                lists.clear(&contenthash_set(name)).await?;
            }
            lists.clear(DOMAINS_SET).await?;
            lists.clear(RESOLVERS_SET).await?;
            println!("indexer data wiped ({} names)", domains.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spage_store::MemoryStore;

    #[test]
    fn name_pattern() {
        assert!(valid_name("alice.eth"));
        assert!(valid_name("my-page-2.eth"));
        assert!(!valid_name("Alice.eth"));
        assert!(!valid_name("alice"));
        assert!(!valid_name("sub.alice.eth"));
        assert!(!valid_name("alice.eth "));
        assert!(!valid_name("under_score.eth"));
    }

    #[tokio::test]
    async fn add_rejects_invalid_names() {
        let store = Arc::new(MemoryStore::new());
        let result = run_list_command(
            Arc::clone(&store),
            spage_core::ALLOW_SET,
            ListAction::Add("Not.Valid".to_string()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reset_wipes_discovery_state() {
        let store = Arc::new(MemoryStore::new());
        let lists = ListRegistry::new(Arc::clone(&store));
        lists
            .add(DOMAINS_SET, &ListValue::Str("alice.eth".into()))
            .await
            .unwrap();
        lists
            .add(RESOLVERS_SET, &ListValue::Address([7u8; 20]))
            .await
            .unwrap();
        lists
            .add(&contenthash_set("alice.eth"), &ListValue::Str("1-x".into()))
            .await
            .unwrap();

        run_indexer_data(Arc::clone(&store), DataAction::Reset)
            .await
            .unwrap();

        assert!(lists.strings(DOMAINS_SET).await.unwrap().is_empty());
        assert!(lists.addresses(RESOLVERS_SET).await.unwrap().is_empty());
        assert!(lists
            .strings(&contenthash_set("alice.eth"))
            .await
            .unwrap()
            .is_empty());
    }
}
