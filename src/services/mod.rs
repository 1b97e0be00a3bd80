pub mod delivery;
pub mod fetcher;
pub mod gc;
pub mod job_store;
pub mod playlist;
pub mod submitter;
pub mod worker;
pub mod ytdlp;
