// SPDX-License-Identifier: MPL-2.0

//! Device and collaborator implementations
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Pipeline / Monitor             │
//! └────────────────────┬────────────────────────┘
//!                      │ traits
//! ┌────────────────────┴────────────────────────┐
//! │  ┌────────────┐ ┌──────────┐ ┌───────────┐  │
//! │  │ FrameSource│ │  Upload  │ │ Analysis  │  │
//! │  │ V4L2 / dir │ │  local   │ │  HTTP     │  │
//! │  └────────────┘ └──────────┘ └───────────┘  │
//! │  ┌──────────────────┐ ┌──────────────────┐  │
//! │  │   Persistence    │ │  Notification    │  │
//! │  │ JSON lines / mem │ │  log / webhook   │  │
//! │  └──────────────────┘ └──────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: frame sources and the frame-pull thread
//! - [`upload`]: capture storage
//! - [`analysis`]: vision service client
//! - [`persistence`]: alert storage
//! - [`notification`]: message delivery

pub mod analysis;
pub mod camera;
pub mod notification;
pub mod persistence;
pub mod upload;
