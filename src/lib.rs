//! Judge-scored quiz matches: two teams, questions drawn per category and
//! level under a usage quota, rounds scored by a human judge.

pub mod catalog;
pub mod config;
pub mod crud;
pub mod error;
pub mod events;
pub mod extract;
pub mod feed;
pub mod game;
pub mod handler;
pub mod ledger;
pub mod locks;
pub mod model;
pub mod repository;
pub mod route;
pub mod schema;
pub mod scoring;
pub mod service;
pub mod summary;
pub mod usage;

use std::sync::atomic::AtomicUsize;

use service::MatchService;

pub struct AppState {
    pub matches: MatchService,
    pub connection_count: AtomicUsize,
}

impl AppState {
    pub fn new(matches: MatchService) -> Self {
        Self {
            matches,
            connection_count: AtomicUsize::new(0),
        }
    }
}
