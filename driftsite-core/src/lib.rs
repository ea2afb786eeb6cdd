// SPDX-FileCopyrightText: 2026 Driftsite Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Driftsite Core Library
//!
//! Publishing core of a decentralized static-site deployer: a local
//! directory tree is replicated onto content-addressed blob servers and
//! each file's location is announced through signed events broadcast to a
//! mesh of independent relays. Gateways rebuild the site from those
//! announcements.
//!
//! The pipeline is scan → fetch remote state → diff → bounded upload
//! fan-out → per-file announcements, with optional purge and metadata
//! publication; see [`publish::Publisher`].

pub mod blossom;
pub mod diff;
pub mod event;
pub mod keys;
pub mod publish;
pub mod relay;
pub mod report;
pub mod scan;
pub mod signer;

pub use blossom::{BlossomClient, BlossomError, ServerResult, UploadOutcome};
pub use diff::{compute_diff, SiteDiff};
pub use event::build::Profile;
pub use event::{Event, EventError, EventTemplate, Tag};
pub use keys::{decode_npub, encode_npub, parse_public_key, KeyError, Keys};
pub use publish::{
    PublishError, PublishOptions, PublishReport, Publisher, RelayStats, ServerStats,
    WebSocketPublisher,
};
pub use relay::{RelayError, RelayOutcome, RemoteSet, TransportConnector, WebSocketConnector};
pub use report::{Category, CollectedMessage, Collector};
pub use scan::{scan_site, FileEntry, ScanError, ScanReport};
pub use signer::remote::{RemoteSigner, SignerCredentials, DEFAULT_RPC_TIMEOUT};
pub use signer::{LocalSigner, Signer, SignerError};
