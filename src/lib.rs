//! Crawl a Google Drive folder tree, pick transcript-like files by date,
//! keyword and identifier, and download them as text.

pub mod cancel;
pub mod config;
pub mod crawler;
pub mod downloader;
pub mod drive;
pub mod filter;
pub mod identifiers;
pub mod models;
pub mod policy;
pub mod report;
pub mod runner;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;
