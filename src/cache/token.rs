//! Cache token records as delivered by the runner with each bundle
//!
//! A bundle request carries a list of tokens of several kinds. This crate only
//! consumes side input tokens; user state tokens belong to the state cache and
//! are skipped.

use crate::cache::types::{Identity, Token};
use serde::{Deserialize, Serialize};

/// What a cache token is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTokenKind {
    /// Per-key user state
    UserState,

    /// A side input of a specific transform
    SideInput {
        transform_id: String,
        side_input_id: String,
    },
}

/// One token record from a bundle request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheToken {
    pub kind: CacheTokenKind,
    pub token: Token,
}

impl CacheToken {
    /// Token for a (transform, side input) pair
    pub fn side_input(
        transform_id: impl Into<String>,
        side_input_id: impl Into<String>,
        token: impl Into<Token>,
    ) -> Self {
        Self {
            kind: CacheTokenKind::SideInput {
                transform_id: transform_id.into(),
                side_input_id: side_input_id.into(),
            },
            token: token.into(),
        }
    }

    /// Token for user state
    pub fn user_state(token: impl Into<Token>) -> Self {
        Self {
            kind: CacheTokenKind::UserState,
            token: token.into(),
        }
    }

    /// The identity this record applies to, if it is a side input token
    pub fn side_input_identity(&self) -> Option<Identity> {
        match &self.kind {
            CacheTokenKind::SideInput {
                transform_id,
                side_input_id,
            } => Some(Identity::new(transform_id.as_str(), side_input_id.as_str())),
            CacheTokenKind::UserState => None,
        }
    }
}

/// Keep only side input records, paired with their identity
pub(crate) fn side_input_claims<'a, I>(records: I) -> Vec<(Identity, Token)>
where
    I: IntoIterator<Item = &'a CacheToken>,
{
    records
        .into_iter()
        .filter_map(|record| {
            record
                .side_input_identity()
                .map(|identity| (identity, record.token.clone()))
        })
        .collect()
}
