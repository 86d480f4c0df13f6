//! Frame fan-out with bounded per-viewer queues
//!
//! One captured frame is rendered once into reactor-owned scratch memory and
//! offered to every authenticated connection.
//!
//! # Architecture
//!
//! ```text
//!                    FrameSource
//!                         │ jpeg
//!                         ▼
//!              encode_frame(scratch)
//!                         │
//!                 BroadcastBuffer<'_>
//!          ┌──────────────┼──────────────────┐
//!          ▼              ▼                  ▼
//!   [fast viewer]   [slow viewer]      [stalled viewer]
//!   write inline    retain() ─► queue  queue full ─► drop
//!   (no alloc)          │
//!                       └── Bytes clone of one shared allocation
//! ```
//!
//! # Zero-Copy Design
//!
//! The shared allocation is only made when the first viewer cannot take the
//! frame synchronously. Every later viewer that needs to hold on to it gets a
//! `bytes::Bytes` clone, which only bumps a reference count. The allocation
//! is released when the last queued copy is flushed or its connection is
//! torn down. `FrameLedger` counts both events.

pub mod frame;
pub mod queue;

pub use frame::{BroadcastBuffer, FrameLedger, Payload};
pub use queue::{FlushStatus, OutboundQueue, SendOutcome};
