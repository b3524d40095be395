// src/repository/mod.rs

//! Channel access: cached metadata client, release sources and archives

mod archive;
mod cache;
mod channel;
mod client;

pub use archive::extract_archive;
pub use cache::{CacheEntry, CacheValidators, ResponseCache};
pub use channel::{
    MemoryReleaseSource, ReleaseDocument, ReleaseSource, ReleaseSummary, RestChannelSource,
    select_release,
};
pub use client::{
    FetchOutcome, HttpRequest, HttpResponse, HttpTransport, MAX_REDIRECTS, MetadataClient,
    Transport, url_basename,
};
