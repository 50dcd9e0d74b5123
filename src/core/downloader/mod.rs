mod client;

pub use client::{
    is_part_file, part_path, verify_digests, Checksum, Downloader, PartFileGuard, StreamHasher,
};
