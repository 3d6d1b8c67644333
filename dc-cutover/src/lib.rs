//! Directory and file-share cutover between Windows servers.
//!
//! This crate drives a multi-stage migration from a source server to a
//! target server. The migration work itself lives in external PowerShell
//! step scripts; this crate decides which steps run, in which order, over
//! which channel, and reports what happened.
//!
//! # Architecture
//!
//! ## Connecting
//!
//! - [`negotiate`] — Pick the channel to a host: agent first when a token is
//!   configured, otherwise the one traditional method the operator selected
//! - [`hint`] — Map connection failures to remediation hints
//! - [`connection`] — The structured result of a connection attempt
//!
//! ## Preparing servers
//!
//! - [`intent`] — What to change on a server (network, firewall, roles, disk)
//! - [`configure`] — Apply an intent over an agent or a traditional session
//! - [`configure_script`] — The PowerShell fragments both paths share
//!
//! ## Migrating
//!
//! - [`plan`] — Build the ordered step list from configuration
//! - [`orchestrate`] — Run a plan: sequential, fail fast, skip missing scripts
//!
//! ## Support
//!
//! - [`config`] — `cutover.toml` loading and credential resolution
//! - [`error`] — Failure taxonomy shared by every report
//! - [`report`] — Terminal rendering
//!
//! # Workflow
//!
//! 1. **Discover** the local domain and candidate controllers
//! 2. **Connect** to the source and target servers
//! 3. **Configure** the target (addressing, firewall, roles, data disk)
//! 4. **Plan** the migration from the configured mode flags
//! 5. **Run** the plan, resuming with `--from` after a fix
//!
//! # Built on remote-exec-core
//!
//! Process execution, transports, the agent client and subnet discovery come
//! from `remote-exec-core`. Everything migration-specific is in this crate.

pub mod config;
pub mod configure;
pub mod configure_script;
pub mod connection;
pub mod error;
pub mod hint;
pub mod intent;
pub mod negotiate;
pub mod orchestrate;
pub mod plan;
pub mod report;
