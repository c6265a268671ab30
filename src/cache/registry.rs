//! Token validity bookkeeping
//!
//! Tracks which token is authoritative for each identity and how many live
//! bundles claim each token. "Known" (the token has been registered at some
//! point) and "busy" (a live bundle still claims it) are deliberately distinct.

use crate::cache::types::{Identity, Token};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct TokenRegistry {
    /// Last registered token per identity
    current: HashMap<Identity, Token>,

    /// Live bundle claims per token; entries are never removed
    ref_counts: HashMap<Token, usize>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bundle has started and claims these tokens as current.
    ///
    /// The last entry for a given identity wins.
    pub fn register_bundle<I>(&mut self, claims: I)
    where
        I: IntoIterator<Item = (Identity, Token)>,
    {
        for (identity, token) in claims {
            *self.ref_counts.entry(token.clone()).or_insert(0) += 1;
            if let Some(previous) = self.current.insert(identity, token.clone()) {
                if previous != token {
                    debug!("Token {} superseded by {}", previous, token);
                }
            }
        }
    }

    /// A bundle has completed and drops its claims.
    ///
    /// Releasing an unknown or already idle token is tolerated.
    pub fn release_bundle<I>(&mut self, claims: I)
    where
        I: IntoIterator<Item = (Identity, Token)>,
    {
        for (identity, token) in claims {
            match self.ref_counts.get_mut(&token) {
                Some(count) if *count > 0 => *count -= 1,
                _ => debug!("Ignoring release of idle token {} for {}", token, identity),
            }
        }
    }

    /// Whether the token has ever been registered
    pub fn is_known(&self, token: &Token) -> bool {
        self.ref_counts.contains_key(token)
    }

    /// Whether a live bundle still claims the token
    pub fn is_busy(&self, token: &Token) -> bool {
        self.ref_counts.get(token).is_some_and(|count| *count > 0)
    }

    pub fn current_token(&self, identity: &Identity) -> Option<&Token> {
        self.current.get(identity)
    }

    pub fn ref_count(&self, token: &Token) -> usize {
        self.ref_counts.get(token).copied().unwrap_or(0)
    }

    /// Number of identities with a registered token
    pub fn identities(&self) -> usize {
        self.current.len()
    }
}
