//! Shared primitive IDs, effort units, and id generation.

use rand::Rng;

/// Operation-log entry identifier.
pub type LogId = String;
/// Monotonic log sequence number.
pub type LogSeq = u64;
/// Assignment identifier.
pub type AssignmentId = String;
/// Subject identifier.
pub type SubjectId = String;
/// Student identifier.
pub type StudentId = String;
/// Submission identifier.
pub type SubmissionId = String;
/// Assignment tag identifier.
pub type TagId = String;
/// Effort measured in whole minutes.
pub type Minutes = i64;

const ID_LEN: usize = 12;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a random base-36 identifier.
pub fn random_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}
