//! Persistence port for the match aggregate.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::MatchError;
use crate::game::{Match, MatchStatus};

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 500;

#[derive(Clone, Debug)]
pub struct MatchFilter {
    pub status: Option<MatchStatus>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for MatchFilter {
    fn default() -> Self {
        Self {
            status: None,
            offset: 0,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn insert(&self, m: &Match) -> Result<(), MatchError>;

    async fn load(&self, id: Uuid) -> Result<Option<Match>, MatchError>;

    /// Stores `m` only if the stored copy is still at `expected_version`.
    /// Fails with `Conflict` otherwise and with `MatchNotFound` if it is gone.
    async fn save(&self, m: &Match, expected_version: i64) -> Result<(), MatchError>;

    /// Matches of `owner`, newest first.
    async fn list(&self, owner: Uuid, filter: &MatchFilter) -> Result<Vec<Match>, MatchError>;

    async fn delete(&self, id: Uuid) -> Result<bool, MatchError>;
}

#[derive(Default)]
pub struct InMemoryMatchRepository {
    matches: DashMap<Uuid, Match>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn insert(&self, m: &Match) -> Result<(), MatchError> {
        self.matches.insert(m.id(), m.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Match>, MatchError> {
        Ok(self.matches.get(&id).map(|m| m.clone()))
    }

    async fn save(&self, m: &Match, expected_version: i64) -> Result<(), MatchError> {
        let mut stored = self
            .matches
            .get_mut(&m.id())
            .ok_or(MatchError::MatchNotFound(m.id()))?;
        if stored.version() != expected_version {
            return Err(MatchError::Conflict(m.id()));
        }
        *stored = m.clone();
        Ok(())
    }

    async fn list(&self, owner: Uuid, filter: &MatchFilter) -> Result<Vec<Match>, MatchError> {
        let mut matches: Vec<Match> = self
            .matches
            .iter()
            .filter(|m| m.owner() == owner)
            .filter(|m| filter.status.map_or(true, |s| m.status() == s))
            .map(|m| m.clone())
            .collect();
        matches.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, MatchError> {
        Ok(self.matches.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CategoryId;
    use crate::game::NewMatch;
    use chrono::{Duration, Utc};

    fn new_match(owner: Uuid, minutes_ago: i64) -> Match {
        Match::create(
            Uuid::new_v4(),
            NewMatch {
                owner,
                categories: vec![CategoryId(Uuid::new_v4())],
                ..NewMatch::default()
            },
            10,
            Utc::now() - Duration::minutes(minutes_ago),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_checks_version() {
        let repo = InMemoryMatchRepository::new();
        let mut m = new_match(Uuid::new_v4(), 0);
        repo.insert(&m).await.unwrap();

        let expected = m.version();
        m.finish(Utc::now()).unwrap();
        repo.save(&m, expected).await.unwrap();

        // A second writer working from the old snapshot loses
        let err = repo.save(&m, expected).await.unwrap_err();
        assert!(matches!(err, MatchError::Conflict(_)));

        let stored = repo.load(m.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), MatchStatus::Finished);
    }

    #[tokio::test]
    async fn test_save_missing_match() {
        let repo = InMemoryMatchRepository::new();
        let m = new_match(Uuid::new_v4(), 0);
        let err = repo.save(&m, 0).await.unwrap_err();
        assert!(matches!(err, MatchError::MatchNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let repo = InMemoryMatchRepository::new();
        let owner = Uuid::new_v4();
        let old = new_match(owner, 30);
        let mut recent = new_match(owner, 1);
        let expected = recent.version();
        repo.insert(&old).await.unwrap();
        repo.insert(&recent).await.unwrap();
        repo.insert(&new_match(Uuid::new_v4(), 0)).await.unwrap();

        recent.finish(Utc::now()).unwrap();
        repo.save(&recent, expected).await.unwrap();

        let all = repo.list(owner, &MatchFilter::default()).await.unwrap();
        let ids: Vec<Uuid> = all.iter().map(Match::id).collect();
        assert_eq!(ids, vec![recent.id(), old.id()]);

        let active = repo
            .list(
                owner,
                &MatchFilter {
                    status: Some(MatchStatus::Active),
                    ..MatchFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), old.id());

        let paged = repo
            .list(
                owner,
                &MatchFilter {
                    offset: 1,
                    limit: 1,
                    ..MatchFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(paged[0].id(), old.id());
    }
}
