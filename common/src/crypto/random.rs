/// Random identifier generation
///
/// Node ids and transaction signatures are opaque identifiers, not
/// cryptographic material, but they must never collide across nodes so they
/// are drawn from the OS CSPRNG rather than a seeded generator.
use rand::rngs::OsRng;
use rand::RngCore;

/// Generate random bytes from the OS entropy source
pub fn secure_random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a random 32-character hex identifier
pub fn random_id() -> String {
    hex::encode(secure_random_bytes::<16>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_random_bytes() {
        let bytes1 = secure_random_bytes::<32>();
        let bytes2 = secure_random_bytes::<32>();

        // Random bytes should be different each time
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_random_id_shape() {
        let id = random_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }
}
