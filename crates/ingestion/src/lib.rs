//! Bid ingestion and bidder identity resolution.
//!
//! This crate handles:
//! - Bidder name normalization and similarity scoring
//! - Resolving raw names against the bidder directory
//! - Human review decisions per bid event
//! - Bidder directory maintenance (create, rename, alias, merge, delete)
//! - Upload import, projects and manual package edits

pub mod directory;
pub mod normalizer;
pub mod packages;
pub mod projects;
pub mod resolver;
pub mod review;
pub mod scorer;
pub mod upload;

pub use directory::{
    add_alias, create_bidder, delete_bidder, list_bidders, merge_bidders, rename_bidder,
    BidderListing, MergeReport,
};
pub use normalizer::normalize_name;
pub use packages::{
    add_package, clear_override, delete_package, override_package, package_view, select_bid,
    NewPackage, PackageView,
};
pub use projects::{create_project, delete_project, update_project, NewProject, ProjectUpdate};
pub use resolver::{IdentityResolver, NameIndex, Resolution};
pub use review::{apply_decisions, bidder_review, BidderDecision, BidderReview, Decision};
pub use scorer::{SimilarityScorer, TokenSetScorer};
pub use upload::{import_bid_event, parse_amount, AmountCell, ImportReport, UploadBid, UploadRow};
