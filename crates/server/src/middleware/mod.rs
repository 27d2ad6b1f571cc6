pub mod profile_id;

pub use profile_id::ProfileId;
