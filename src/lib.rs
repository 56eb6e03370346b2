//! Gitgres: a Git object/ref database backed by a relational store.
//!
//! The object model (`oid`, `hash`, `tree`, `commit`) and the two pluggable
//! backends (`odb`, `refdb`) are independent of libgit2's process model;
//! `repo` wires them into a `git2::Repository`, and `remote_helper` drives
//! them from an unmodified `git` client over the `git-remote-*` protocol.

pub mod commit;
pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod odb;
pub mod oid;
pub mod refdb;
pub mod remote_helper;
pub mod repo;
pub mod tree;
pub mod trace;

pub use error::{GitgresError, Result};
pub use oid::Oid;
pub use repo::GitgresRepo;
