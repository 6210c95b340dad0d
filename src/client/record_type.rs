//! Record type mnemonics understood by the DNS-JSON client.
//!
//! DNS-JSON requests name the record type by mnemonic, but answers carry the
//! IANA number, so lookups translate one to the other to filter answers.
//! See <https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml>.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

static TYPE_NUMBERS: LazyLock<FxHashMap<&'static str, u16>> = LazyLock::new(|| {
    [
        ("A", 1),
        ("NS", 2),
        ("CNAME", 5),
        ("SOA", 6),
        ("PTR", 12),
        ("MX", 15),
        ("TXT", 16),
        ("AAAA", 28),
        ("SRV", 33),
    ]
    .into_iter()
    .collect()
});

/// Look up the IANA type number for a mnemonic such as `"AAAA"`.
///
/// Mnemonics are case-sensitive, as they are sent verbatim upstream.
pub fn type_number(mnemonic: &str) -> Option<u16> {
    TYPE_NUMBERS.get(mnemonic).copied()
}
