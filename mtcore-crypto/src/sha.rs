//! Hash helpers.
//!
//! Both macros accept any number of byte-slice expressions and hash their
//! concatenation, so key-derivation formulas read like their definitions:
//!
//! ```
//! let a = mtcore_crypto::sha1!(b"msg_key", b"auth_key part");
//! assert_eq!(a.len(), 20);
//! ```

/// SHA-1 of the concatenation of one or more byte slices, as `[u8; 20]`.
#[macro_export]
macro_rules! sha1 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::__private::sha1::{Digest, Sha1};
        let mut h = Sha1::new();
        $( h.update($x); )+
        let out: [u8; 20] = h.finalize().into();
        out
    }};
}

/// SHA-256 of the concatenation of one or more byte slices, as `[u8; 32]`.
#[macro_export]
macro_rules! sha256 {
    ( $( $x:expr ),+ $(,)? ) => {{
        use $crate::__private::sha2::{Digest, Sha256};
        let mut h = Sha256::new();
        $( h.update($x); )+
        let out: [u8; 32] = h.finalize().into();
        out
    }};
}

/// Read eight bytes of a digest as a little-endian integer.
pub(crate) fn le_u64(bytes: &[u8]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(b)
}
