use crate::core::{GridError, Result};
use crate::function::{Function, FunctionAttributes, FunctionInvocation, FunctionRegistry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

// Cluster support is split by responsibility for easier navigation.
include!("cluster/membership.rs");
include!("cluster/key_owner.rs");
include!("cluster/member.rs");
include!("cluster/forwarder.rs");
include!("cluster/in_memory_forwarder.rs");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_membership_owns_nothing() {
        let membership = ClusterMembership::new(Vec::new()).unwrap();
        assert!(membership.is_empty());
        assert_eq!(membership.owner_of("key2"), None);
    }

    #[test]
    fn blank_member_names_are_rejected() {
        assert!(ClusterMembership::new(vec!["m1".to_string(), " ".to_string()]).is_err());
    }

    #[test]
    fn key_owner_is_stable_and_independent_of_insertion_order() {
        let forward = ClusterMembership::new(
            ["m1", "m2", "m3", "m4"].map(String::from).to_vec(),
        )
        .unwrap();
        let reverse = ClusterMembership::new(
            ["m4", "m3", "m2", "m1"].map(String::from).to_vec(),
        )
        .unwrap();
        assert_eq!(forward.len(), 4);
        assert_eq!(forward.all_members(), vec!["m1", "m2", "m3", "m4"]);

        for key in ["key1", "key2", "customer:42"] {
            let owner = forward.owner_of(key).unwrap();
            assert_eq!(reverse.owner_of(key).as_deref(), Some(owner.as_str()));
            assert!(forward.all_members().contains(&owner));
        }
    }

    #[test]
    fn stable_slot_stays_in_range() {
        assert_eq!(stable_slot_for("anything", 0), 0);
        for key in ["a", "b", "key2"] {
            assert!(stable_slot_for(key, 3) < 3);
            assert_eq!(stable_slot_for(key, 3), stable_slot_for(key, 3));
        }
    }
}
