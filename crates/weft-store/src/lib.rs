// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weft-store: normalized record store for GraphQL responses.
//!
//! Responses are flattened into records keyed by [`DataId`] inside
//! transactions opened on a [`Store`]. Paginated fields are spliced into
//! client connections by the [`ConnectionHandler`]; mutations can edit those
//! connections declaratively through [`MutationConfig`]s. The
//! [`commit_payload`] pipeline runs all of it in one transaction.
#![forbid(unsafe_code)]

mod commit;
mod config;
mod connection;
mod disposable;
mod handler;
mod ident;
mod mutation_config;
mod normalizer;
mod pagination;
mod proxy;
mod reader;
mod record;
mod snapshot;
mod source;
mod store;
mod tx;

/// Payload commit pipeline.
pub use commit::{
    apply_optimistic_payload, commit_payload, root_field_record, root_linked_field, CommitError,
    CommitReport, CommitRequest, Updater, UpdaterError,
};
/// Store configuration.
pub use config::{ConnectionInterface, StoreConfig, Strictness};
/// Connection splicing.
pub use connection::{ConnectionHandler, CONNECTION_HANDLE, NEXT_EDGE_INDEX};
/// Disposable handles.
pub use disposable::{Disposable, RetainHandle, Subscription, SubscriptionCallback};
/// Field handler seam.
pub use handler::{
    apply_field_payloads, FieldHandler, HandleFieldPayload, HandlerError, HandlerProvider,
    HandlerRegistry,
};
/// Record identifiers.
pub use ident::{generate_client_id, DataId, CLIENT_ID_PREFIX, ROOT_ID, ROOT_TYPE};
/// Declarative mutation configs.
pub use mutation_config::{
    apply_mutation_configs, deleted_ids, ConnectionInfo, DeletedIdField, MutationConfig,
    MutationConfigError, RangeBehavior, RootFieldPayload,
};
/// Response normalization.
pub use normalizer::{
    normalize, normalize_split_operation, IncrementalKind, IncrementalPlaceholder,
    ModuleImportPayload, NormalizationOutcome, NormalizeError, NormalizeOptions, PayloadError,
    PayloadErrorKind, ID_KEY, TYPENAME_KEY,
};
/// Pagination helpers.
pub use pagination::{ConnectionMetadata, Direction, PageInfo};
/// Transactional mutation views.
pub use proxy::{RecordProxy, RecordSourceProxy};
/// Reading selections back out of the store.
pub use reader::{read, ReaderSnapshot, Selector, MATCH_COMPONENT_KEY, MATCH_FRAGMENT_KEY};
/// Records and field values.
pub use record::{FieldValue, Record};
/// State digests.
pub use snapshot::{compute_state_hash, Hash, Snapshot};
/// Committed record maps.
pub use source::{RecordSource, RecordStatus};
/// The store.
pub use store::{CommitReceipt, Store, StoreError};
/// Transaction identifiers.
pub use tx::{OptimisticUpdateId, TxId, TxKind};
