//! Seat credential checks.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// A request to occupy a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatClaim<'a> {
    /// Match being joined.
    pub match_id: &'a str,
    /// Seat being claimed.
    pub player_id: &'a str,
    /// Token presented by the client.
    pub credentials: Option<&'a str>,
}

/// Decides whether a client may occupy a seat.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Return `true` to honor the claim.
    async fn authenticate(&self, claim: &SeatClaim<'_>) -> bool;
}

/// Accepts every claim.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn authenticate(&self, _claim: &SeatClaim<'_>) -> bool {
        true
    }
}

/// Per-seat credential table.
///
/// With `bind_first_claim` enabled, the first credential presented for an
/// unknown seat is recorded and required from then on.
#[derive(Debug, Default)]
pub struct CredentialStore {
    seats: DashMap<(String, String), String>,
    bind_first_claim: bool,
}

impl CredentialStore {
    /// Create a store that only accepts registered credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that binds a seat to the first credential it sees.
    #[must_use]
    pub fn binding_first_claim() -> Self {
        Self {
            seats: DashMap::new(),
            bind_first_claim: true,
        }
    }

    /// Register the credential for a seat, replacing any previous one.
    pub fn insert(
        &self,
        match_id: impl Into<String>,
        player_id: impl Into<String>,
        credentials: impl Into<String>,
    ) {
        self.seats
            .insert((match_id.into(), player_id.into()), credentials.into());
    }

    /// Forget every seat of a match.
    pub fn remove_match(&self, match_id: &str) {
        self.seats.retain(|(m, _), _| m != match_id);
    }

    fn check(&self, claim: &SeatClaim<'_>) -> bool {
        let Some(presented) = claim.credentials else {
            return false;
        };
        let key = (claim.match_id.to_string(), claim.player_id.to_string());

        if let Some(expected) = self.seats.get(&key) {
            return expected.as_str() == presented;
        }

        if self.bind_first_claim {
            // Of two racing first claims only one binds.
            let bound = self.seats.entry(key).or_insert_with(|| presented.to_string());
            debug!(match_id = %claim.match_id, player = %claim.player_id, "Seat credential bound");
            return bound.as_str() == presented;
        }

        false
    }
}

#[async_trait]
impl Authenticator for CredentialStore {
    async fn authenticate(&self, claim: &SeatClaim<'_>) -> bool {
        self.check(claim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim<'a>(player_id: &'a str, credentials: Option<&'a str>) -> SeatClaim<'a> {
        SeatClaim {
            match_id: "matchID",
            player_id,
            credentials,
        }
    }

    #[tokio::test]
    async fn test_allow_all() {
        assert!(AllowAll.authenticate(&claim("0", None)).await);
    }

    #[tokio::test]
    async fn test_registered_credentials() {
        let store = CredentialStore::new();
        store.insert("matchID", "0", "secret");

        assert!(store.authenticate(&claim("0", Some("secret"))).await);
        assert!(!store.authenticate(&claim("0", Some("guess"))).await);
        assert!(!store.authenticate(&claim("0", None)).await);
        assert!(!store.authenticate(&claim("1", Some("secret"))).await);

        store.remove_match("matchID");
        assert!(!store.authenticate(&claim("0", Some("secret"))).await);
    }

    #[tokio::test]
    async fn test_first_claim_binds_seat() {
        let store = CredentialStore::binding_first_claim();

        assert!(store.authenticate(&claim("0", Some("mine"))).await);
        assert!(store.authenticate(&claim("0", Some("mine"))).await);
        assert!(!store.authenticate(&claim("0", Some("theirs"))).await);
        assert!(!store.authenticate(&claim("1", None)).await);
    }
}
