//! Referral Directory — registration, ancestor chains, network trees.
//!
//! Owns every structural write on users: code issuance, parent/child links,
//! depth. Registration performs two writes (insert child, append to the
//! parent's child list) that are NOT one transaction; all network queries
//! therefore derive membership from the parent pointer, so an orphaned
//! child is still visible.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::code::{generate_candidate, MAX_CODE_ATTEMPTS};
use crate::error::{RefnetError, Result};
use crate::ports::UserStore;
use crate::types::{Ancestor, FeeTier, User, MAX_REFERRAL_DEPTH};

/// One entry of an ancestor chain, level 1 = direct referrer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorRef {
    pub user_id: Uuid,
    pub level: u8,
    pub referral_code: String,
}

/// A node of the descendant tree. The root carries level 0; its direct
/// referrals level 1, and so on down to [`MAX_REFERRAL_DEPTH`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNode {
    pub user_id: Uuid,
    pub referral_code: String,
    pub level: u8,
    pub joined_at: DateTime<Utc>,
    pub children: Vec<NetworkNode>,
}

impl NetworkNode {
    /// Pre-order flattening: every parent precedes its children.
    pub fn flatten(&self) -> Vec<NetworkMember> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<NetworkMember>) {
        out.push(NetworkMember {
            user_id: self.user_id,
            referral_code: self.referral_code.clone(),
            level: self.level,
            joined_at: self.joined_at,
        });
        for child in &self.children {
            child.flatten_into(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMember {
    pub user_id: Uuid,
    pub referral_code: String,
    pub level: u8,
    pub joined_at: DateTime<Utc>,
}

/// Flattened network listing with its total member count (root included).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkList {
    pub members: Vec<NetworkMember>,
    pub total: usize,
}

#[derive(Clone)]
pub struct ReferralDirectory {
    users: Arc<dyn UserStore>,
}

impl ReferralDirectory {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| RefnetError::NotFound(format!("user {user_id} not found")))
    }

    /// Create a root user (no referrer, depth 0) with a fresh unique code.
    pub async fn create_root_user(&self, fee_tier: FeeTier) -> Result<User> {
        let user = self.insert_with_fresh_code(None, fee_tier).await?;
        info!(user = %user.user_id, code = %user.referral_code, "created root user");
        Ok(user)
    }

    /// Register a new user under the owner of `code`.
    ///
    /// The owner's depth is recomputed by walking the ancestor chain rather
    /// than trusted from the cached field; a divergence is logged and the
    /// walked value wins.
    pub async fn register_with_code(&self, code: &str) -> Result<User> {
        let owner = self
            .users
            .get_user_by_code(code)
            .await?
            .ok_or_else(|| RefnetError::NotFound(format!("referral code {code} not found")))?;

        let walked_depth = self.ancestors_of(&owner).await?.len() as u8;
        if walked_depth != owner.referral_depth {
            warn!(
                user = %owner.user_id,
                cached = owner.referral_depth,
                walked = walked_depth,
                "stored referral depth diverges from ancestor walk"
            );
        }
        if walked_depth >= MAX_REFERRAL_DEPTH {
            return Err(RefnetError::InvalidInput(format!(
                "referral depth limit of {MAX_REFERRAL_DEPTH} exceeded"
            )));
        }

        let child = self
            .insert_with_fresh_code(Some((owner.user_id, walked_depth + 1)), FeeTier::Base)
            .await?;
        self.users.append_child(owner.user_id, child.user_id).await?;
        info!(
            user = %child.user_id,
            referrer = %owner.user_id,
            depth = child.referral_depth,
            "registered referral"
        );
        Ok(child)
    }

    /// Ancestors of `user_id`, level 1 first, at most [`MAX_REFERRAL_DEPTH`]
    /// entries.
    pub async fn ancestor_chain(&self, user_id: Uuid) -> Result<Vec<AncestorRef>> {
        let user = self.get_user(user_id).await?;
        Ok(self
            .ancestors_of(&user)
            .await?
            .into_iter()
            .map(|a| AncestorRef {
                user_id: a.user.user_id,
                level: a.level,
                referral_code: a.user.referral_code,
            })
            .collect())
    }

    /// Full ancestor users for rate resolution during distribution.
    pub(crate) async fn ancestors_of(&self, user: &User) -> Result<Vec<Ancestor>> {
        let mut out: Vec<Ancestor> = Vec::new();
        let mut cursor = user.referrer_id;
        while let Some(parent_id) = cursor {
            if out.len() as u8 >= MAX_REFERRAL_DEPTH {
                break;
            }
            let parent = self
                .users
                .get_user(parent_id)
                .await?
                .ok_or_else(|| RefnetError::NotFound(format!("user {parent_id} not found")))?;
            cursor = parent.referrer_id;
            let level = out.len() as u8 + 1;
            out.push(Ancestor { level, user: parent });
        }
        Ok(out)
    }

    /// Descendant tree of `user_id`, bounded to [`MAX_REFERRAL_DEPTH`]
    /// levels below the root. Membership comes from parent pointers.
    pub async fn network_tree(&self, user_id: Uuid) -> Result<NetworkNode> {
        let root = self.get_user(user_id).await?;

        let mut by_parent: HashMap<Uuid, Vec<User>> = HashMap::new();
        let mut frontier = vec![root.clone()];
        for _ in 0..MAX_REFERRAL_DEPTH {
            let mut next = Vec::new();
            for node in &frontier {
                let children = self.users.children_of(node.user_id).await?;
                if !children.is_empty() {
                    next.extend(children.iter().cloned());
                    by_parent.insert(node.user_id, children);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(assemble(root, 0, &by_parent))
    }

    /// Pre-order network listing with total count.
    pub async fn network_members(&self, user_id: Uuid) -> Result<NetworkList> {
        let tree = self.network_tree(user_id).await?;
        let members = tree.flatten();
        debug!(root = %user_id, total = members.len(), "materialized network");
        Ok(NetworkList {
            total: members.len(),
            members,
        })
    }

    /// Admin path: replace a user's commission override.
    pub async fn set_commission_structure(
        &self,
        user_id: Uuid,
        structure: Option<crate::types::CustomCommissionStructure>,
    ) -> Result<User> {
        self.users
            .set_commission_structure(user_id, structure.as_ref())
            .await?;
        self.get_user(user_id).await
    }

    /// Admin path: change a user's fee tier.
    pub async fn set_fee_tier(&self, user_id: Uuid, fee_tier: FeeTier) -> Result<User> {
        self.users.set_fee_tier(user_id, fee_tier).await?;
        self.get_user(user_id).await
    }

    async fn insert_with_fresh_code(
        &self,
        referrer: Option<(Uuid, u8)>,
        fee_tier: FeeTier,
    ) -> Result<User> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = generate_candidate();
            let user = match referrer {
                Some((referrer_id, depth)) => User::under(code, referrer_id, depth),
                None => User::root(code, fee_tier),
            };
            match self.users.insert_user(&user).await {
                Ok(()) => return Ok(user),
                Err(RefnetError::Conflict(_)) => {
                    debug!(attempt, "referral code collision, regenerating");
                }
                Err(other) => return Err(other),
            }
        }
        Err(RefnetError::Conflict(format!(
            "referral code space exhausted after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }
}

fn assemble(user: User, level: u8, by_parent: &HashMap<Uuid, Vec<User>>) -> NetworkNode {
    let children = by_parent.get(&user.user_id).cloned().unwrap_or_default();
    NetworkNode {
        user_id: user.user_id,
        referral_code: user.referral_code,
        level,
        joined_at: user.created_at,
        children: children
            .into_iter()
            .map(|c| assemble(c, level + 1, by_parent))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::is_valid_code;
    use crate::memory::MemoryStore;

    fn directory() -> (ReferralDirectory, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ReferralDirectory::new(store.clone()), store)
    }

    #[tokio::test]
    async fn root_user_gets_a_valid_code() {
        let (dir, _) = directory();
        let user = dir.create_root_user(FeeTier::Base).await.unwrap();
        assert!(is_valid_code(&user.referral_code));
        assert_eq!(user.referral_depth, 0);
    }

    #[tokio::test]
    async fn registration_increments_depth() {
        let (dir, _) = directory();
        let root = dir.create_root_user(FeeTier::Base).await.unwrap();
        let l1 = dir.register_with_code(&root.referral_code).await.unwrap();
        let l2 = dir.register_with_code(&l1.referral_code).await.unwrap();
        let l3 = dir.register_with_code(&l2.referral_code).await.unwrap();

        assert_eq!(l1.referral_depth, 1);
        assert_eq!(l2.referral_depth, 2);
        assert_eq!(l3.referral_depth, 3);
        assert_eq!(l1.referrer_id, Some(root.user_id));
        assert_eq!(l3.referrer_id, Some(l2.user_id));
    }

    #[tokio::test]
    async fn registration_below_depth_three_fails() {
        let (dir, _) = directory();
        let root = dir.create_root_user(FeeTier::Base).await.unwrap();
        let l1 = dir.register_with_code(&root.referral_code).await.unwrap();
        let l2 = dir.register_with_code(&l1.referral_code).await.unwrap();
        let l3 = dir.register_with_code(&l2.referral_code).await.unwrap();

        let err = dir.register_with_code(&l3.referral_code).await.unwrap_err();
        assert!(matches!(err, RefnetError::InvalidInput(_)), "{err}");
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let (dir, _) = directory();
        let err = dir.register_with_code("NOSUCH22").await.unwrap_err();
        assert!(matches!(err, RefnetError::NotFound(_)));
    }

    #[tokio::test]
    async fn registration_appends_to_parent_child_list() {
        let (dir, store) = directory();
        let root = dir.create_root_user(FeeTier::Base).await.unwrap();
        let a = dir.register_with_code(&root.referral_code).await.unwrap();
        let b = dir.register_with_code(&root.referral_code).await.unwrap();

        let stored = store.get_user(root.user_id).await.unwrap().unwrap();
        assert_eq!(stored.children, vec![a.user_id, b.user_id]);
    }

    #[tokio::test]
    async fn ancestor_chain_is_level_ordered_and_capped() {
        let (dir, _) = directory();
        let root = dir.create_root_user(FeeTier::Base).await.unwrap();
        let l1 = dir.register_with_code(&root.referral_code).await.unwrap();
        let l2 = dir.register_with_code(&l1.referral_code).await.unwrap();
        let l3 = dir.register_with_code(&l2.referral_code).await.unwrap();

        let chain = dir.ancestor_chain(l3.user_id).await.unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(
            chain.iter().map(|a| a.level).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(chain[0].user_id, l2.user_id);
        assert_eq!(chain[1].user_id, l1.user_id);
        assert_eq!(chain[2].user_id, root.user_id);

        assert!(dir.ancestor_chain(root.user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn network_tree_is_pre_order_with_total() {
        let (dir, _) = directory();
        let root = dir.create_root_user(FeeTier::Base).await.unwrap();
        let a = dir.register_with_code(&root.referral_code).await.unwrap();
        let b = dir.register_with_code(&root.referral_code).await.unwrap();
        let a1 = dir.register_with_code(&a.referral_code).await.unwrap();

        let list = dir.network_members(root.user_id).await.unwrap();
        assert_eq!(list.total, 4);
        let ids: Vec<Uuid> = list.members.iter().map(|m| m.user_id).collect();
        // Pre-order: root, a, a1, b.
        assert_eq!(ids, vec![root.user_id, a.user_id, a1.user_id, b.user_id]);
        let levels: Vec<u8> = list.members.iter().map(|m| m.level).collect();
        assert_eq!(levels, vec![0, 1, 2, 1]);
    }

    #[tokio::test]
    async fn network_tree_unknown_root_is_not_found() {
        let (dir, _) = directory();
        let err = dir.network_tree(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RefnetError::NotFound(_)));
    }

    #[tokio::test]
    async fn orphaned_child_still_appears_in_network() {
        // Simulate a crash between child insert and parent append: the user
        // exists with a parent pointer but is missing from the child list.
        let (dir, store) = directory();
        let root = dir.create_root_user(FeeTier::Base).await.unwrap();
        let orphan = User::under("ORPHAN22".into(), root.user_id, 1);
        store.insert_user(&orphan).await.unwrap();

        let list = dir.network_members(root.user_id).await.unwrap();
        assert!(list.members.iter().any(|m| m.user_id == orphan.user_id));
    }

    #[tokio::test]
    async fn code_space_exhaustion_is_a_conflict() {
        // A store whose insert always reports a code collision.
        struct AlwaysColliding;

        #[async_trait::async_trait]
        impl UserStore for AlwaysColliding {
            async fn insert_user(&self, _user: &User) -> Result<()> {
                Err(RefnetError::Conflict("referral code taken".into()))
            }
            async fn get_user(&self, _user_id: Uuid) -> Result<Option<User>> {
                Ok(None)
            }
            async fn get_user_by_code(&self, _code: &str) -> Result<Option<User>> {
                Ok(None)
            }
            async fn append_child(&self, _parent_id: Uuid, _child_id: Uuid) -> Result<()> {
                Ok(())
            }
            async fn children_of(&self, _parent_id: Uuid) -> Result<Vec<User>> {
                Ok(vec![])
            }
            async fn increment_balances(
                &self,
                _user_id: Uuid,
                _delta: &crate::ports::BalanceDelta,
            ) -> Result<()> {
                Ok(())
            }
            async fn set_commission_structure(
                &self,
                _user_id: Uuid,
                _structure: Option<&crate::types::CustomCommissionStructure>,
            ) -> Result<()> {
                Ok(())
            }
            async fn set_fee_tier(&self, _user_id: Uuid, _fee_tier: FeeTier) -> Result<()> {
                Ok(())
            }
        }

        let dir = ReferralDirectory::new(Arc::new(AlwaysColliding));
        let err = dir.create_root_user(FeeTier::Base).await.unwrap_err();
        assert!(err.to_string().contains("exhausted"), "{err}");
    }
}
