//! PostgreSQL repositories

pub mod acknowledgments;
pub mod notifications;
pub mod petitions;
pub mod referrals;

pub use acknowledgments::PgAcknowledgmentRepository;
pub use notifications::PgNotificationPreferenceRepository;
pub use petitions::PgPetitionRepository;
pub use referrals::PgReferralRepository;
