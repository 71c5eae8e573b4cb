//! Naming Codec
//!
//! Array NAME fields are limited to [`MAX_NAME_LENGTH`] characters. Host
//! names and volume UUIDs are folded into that budget deterministically so
//! that repeated create-or-find calls land on the same array object. The
//! encodings match the ones used by the OpenStack Cinder driver for the same
//! arrays, so objects created by either tool are found by the other.
//!
//! The fold is lossy: two long host names collide when their digests share
//! the truncated prefix. That risk is accepted.

use uuid::Uuid;

/// Maximum length of an array NAME field
pub const MAX_NAME_LENGTH: usize = 31;

/// Literal prefix of LUN and snapshot names
pub const VOLUME_NAME_PREFIX: &str = "w-";

/// Prefix of LUN descriptions, followed by the full volume UUID
pub const VOLUME_DESCRIPTION_PREFIX: &str = "volume-";

/// Encode a host name for the host, host group, LUN group and mapping view
/// NAME fields.
///
/// Names within the limit pass through unchanged; longer names become the
/// first [`MAX_NAME_LENGTH`] hex characters of their MD5 digest.
pub fn encode_host_name(hostname: &str) -> String {
    if hostname.len() > MAX_NAME_LENGTH {
        let digest = format!("{:x}", md5::compute(hostname.as_bytes()));
        return digest[..MAX_NAME_LENGTH].to_string();
    }

    hostname.to_string()
}

/// Encode a volume UUID into a LUN NAME.
///
/// `w-<first uuid group>-` followed by the hex MD5 of the raw UUID bytes,
/// truncated to fill the field exactly.
pub fn encode_lun_name(id: &Uuid) -> String {
    let text = id.hyphenated().to_string();
    let first_group = text.split('-').next().unwrap_or_default();
    let prefix = format!("{}{}-", VOLUME_NAME_PREFIX, first_group);

    let digest = format!("{:x}", md5::compute(id.as_bytes()));
    let remaining = MAX_NAME_LENGTH - prefix.len();

    format!("{}{}", prefix, &digest[..remaining])
}

/// Snapshots share the LUN naming scheme
pub fn encode_snapshot_name(id: &Uuid) -> String {
    encode_lun_name(id)
}

/// Description stored on a LUN created for a volume
pub fn volume_description(id: &Uuid) -> String {
    format!("{}{}", VOLUME_DESCRIPTION_PREFIX, id.hyphenated())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_host_name_unchanged() {
        assert_eq!(encode_host_name("compute-07"), "compute-07");

        let exact = "a".repeat(MAX_NAME_LENGTH);
        assert_eq!(encode_host_name(&exact), exact);
    }

    #[test]
    fn test_long_host_name_hashed() {
        let long = "compute-node-07.rack-12.datacenter.example.com";
        let encoded = encode_host_name(long);

        assert_eq!(encoded.len(), MAX_NAME_LENGTH);
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(encoded, encode_host_name(long));
        assert!(format!("{:x}", md5::compute(long)).starts_with(&encoded));
    }

    #[test]
    fn test_lun_name_layout() {
        let id = Uuid::parse_str("4b2b6a5c-1d2e-4f60-8a9b-0c1d2e3f4a5b").unwrap();
        let name = encode_lun_name(&id);

        assert_eq!(name.len(), MAX_NAME_LENGTH);
        assert!(name.starts_with("w-4b2b6a5c-"));

        let digest = format!("{:x}", md5::compute(id.as_bytes()));
        assert_eq!(&name["w-4b2b6a5c-".len()..], &digest[..20]);
    }

    #[test]
    fn test_lun_name_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(encode_lun_name(&id), encode_lun_name(&id));
        assert_eq!(encode_snapshot_name(&id), encode_lun_name(&id));
    }

    #[test]
    fn test_lun_name_distinguishes_tail_groups() {
        let a = Uuid::parse_str("4b2b6a5c-1d2e-4f60-8a9b-0c1d2e3f4a5b").unwrap();
        let b = Uuid::parse_str("4b2b6a5c-1d2e-4f60-8a9b-0c1d2e3f4a5c").unwrap();

        let (na, nb) = (encode_lun_name(&a), encode_lun_name(&b));
        assert_eq!(&na[..11], &nb[..11]);
        assert_ne!(na, nb);
    }

    #[test]
    fn test_volume_description() {
        let id = Uuid::parse_str("4b2b6a5c-1d2e-4f60-8a9b-0c1d2e3f4a5b").unwrap();
        assert_eq!(
            volume_description(&id),
            "volume-4b2b6a5c-1d2e-4f60-8a9b-0c1d2e3f4a5b"
        );
    }
}
