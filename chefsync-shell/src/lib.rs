//! # chefsync-shell
//!
//! Subprocess adapters for the chefsync ports: [`GitCli`] for [`Vcs`],
//! [`KnifeServer`] for [`ConfigServer`], and the `ruby` / `foodcritic`
//! [`Validator`]s.
//!
//! [`Vcs`]: chefsync_core::ports::Vcs
//! [`ConfigServer`]: chefsync_core::ports::ConfigServer
//! [`Validator`]: chefsync_core::ports::Validator

pub mod git;
pub mod knife;
pub mod validators;

pub use git::GitCli;
pub use knife::{Knife, KnifeServer};
pub use validators::{validators_by_name, Foodcritic, KnifeCookbookTest, KNOWN_VALIDATORS};
