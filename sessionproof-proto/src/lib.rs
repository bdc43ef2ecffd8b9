//! Session-proof protocol - Protobuf types for the identity server API

/// Generated protobuf types
pub mod v1 {
    tonic::include_proto!("sessionproof.v1");
}

pub use v1::*;

/// Metadata key carrying the logged-in user id on calls made for a user.
pub const USER_HEADER: &str = "x-authenticated-user";

/// Metadata key carrying the secret shared with the session layer.
pub const TOKEN_HEADER: &str = "x-frontend-token";

/// File descriptor set for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] =
    tonic::include_file_descriptor_set!("sessionproof_descriptor");

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

    #[test]
    fn test_caller_headers_are_ascii_metadata_keys() {
        let mut metadata = MetadataMap::new();
        metadata.insert(
            AsciiMetadataKey::from_static(USER_HEADER),
            AsciiMetadataValue::from_static("u1"),
        );
        metadata.insert(
            AsciiMetadataKey::from_static(TOKEN_HEADER),
            AsciiMetadataValue::from_static("secret"),
        );

        assert_eq!(metadata.get(USER_HEADER).unwrap().to_str().unwrap(), "u1");
        assert_eq!(metadata.get(TOKEN_HEADER).unwrap().to_str().unwrap(), "secret");
    }
}
