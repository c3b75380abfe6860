//! rcgc: reachability-tracking core for a cycle-collecting RC garbage collector
//!
//! This crate is the cycle-detection heart of a reference-counting collector:
//! it decides, for an object whose root-reference count has dropped to zero,
//! whether the object is still transitively reachable from some root, and if
//! not, reclaims the entire unreachable subgraph, cycles included, without
//! a full heap trace.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            GcRuntime                                 │
//! │        (root-count + edge mutation entry points, lock hooks)         │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  RefGraph                                                            │
//! │    node arena      ── Node: root_ref_count, flags, SafeAnchorState   │
//! │    anchor chunks   ── incoming-edge sets (empty / single / chunked)  │
//! │    shortcut pool   ── path-compressed chains between anchor and tail │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  GarbageProcessor                                                    │
//! │    unstable queue ─▶ survival-path search ─▶ confirmed garbage ─▶    │
//! │    reclamation cascade (severed anchors re-enter the queue)          │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The mutator reports reference writes through [`GcRuntime`]:
//! [`GcRuntime::assign_root`] / [`GcRuntime::erase_root`] for stack/global
//! references and [`GcRuntime::connect`] / [`GcRuntime::disconnect`] for
//! heap edges. A node whose root count reaches zero is queued as *unstable*;
//! [`GcRuntime::collect_garbage`] later drains the queue in batches, running a
//! survival-path search per node. A successful search leaves behind a
//! *shortcut*: a path-compressed record that turns the proven chain into an
//! O(1) jump for every later search touching it.
//!
//! # What this crate is not
//!
//! Object allocation and layout, moving collection, write-barrier code
//! generation, and weak-reference policy all live in the host. The host shows
//! up here only as three small traits: [`ObjectGraph`] (field enumeration),
//! [`ReclaimSink`] (where confirmed garbage goes), and [`MutationLock`]
//! (serialization of structural mutation).
//!
//! # Concurrency
//!
//! The anchor/shortcut graph has a single logical writer. The crate never
//! takes a lock of its own; it invokes the host's [`MutationLock`] around
//! mutations of *published* nodes and assumes external serialization for
//! everything else.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod host;
pub mod stats;
pub mod verify;

mod collector;
mod graph;
mod pool;
mod runtime;

pub use config::{ConfigError, GcConfig};
pub use graph::node::{NodeId, SafeAnchorState};
pub use graph::shortcut::ShortcutId;
pub use host::{MutationLock, NullLock, ObjectGraph, RawMutexLock, ReclaimSink};
pub use pool::SlotPool;
pub use runtime::GcRuntime;
pub use stats::{GcStats, GcTimer};
