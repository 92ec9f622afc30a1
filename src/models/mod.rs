use uuid::Uuid;

pub mod ad;
pub mod confirmation;

// Re-exports for convenience
pub use ad::*;
pub use confirmation::*;

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
