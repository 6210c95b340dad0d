//! Just enough DNS wire format to log queries and answer failures.
//!
//! Queries are otherwise relayed as opaque bytes.

const HEADER_LEN: usize = 12;

const FLAG_QR: u16 = 0x8000;
const MASK_OPCODE_RD: u16 = 0x7900;
const FLAG_RA: u16 = 0x0080;
const RCODE_SERVFAIL: u16 = 2;

/// A parsed DNS query.
#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub domain: String,
    pub qtype: u16,
}

impl DnsQuery {
    /// Parse the first question of a DNS query from raw bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN + 1 {
            return None;
        }

        // Parse domain name
        let mut pos = HEADER_LEN;
        let mut domain_parts = Vec::new();

        loop {
            let label_len = *data.get(pos)? as usize;
            pos += 1;
            if label_len == 0 {
                break;
            }
            // Compression pointers never appear in a well-formed question.
            if label_len >= 0x40 || pos + label_len > data.len() {
                return None;
            }
            let label = std::str::from_utf8(&data[pos..pos + label_len]).ok()?;
            domain_parts.push(label);
            pos += label_len;
        }

        // QTYPE, then QCLASS which the relay has no use for
        if pos + 4 > data.len() {
            return None;
        }
        let qtype = u16::from_be_bytes([data[pos], data[pos + 1]]);

        let domain = if domain_parts.is_empty() {
            ".".to_string()
        } else {
            domain_parts.join(".").to_lowercase()
        };

        Some(Self { domain, qtype })
    }
}

/// Offset just past the question section, if the query carries exactly one
/// well-formed question.
fn question_end(query: &[u8]) -> Option<usize> {
    let qdcount = u16::from_be_bytes([query[4], query[5]]);
    if qdcount != 1 {
        return None;
    }

    let mut pos = HEADER_LEN;
    loop {
        let label_len = *query.get(pos)? as usize;
        pos += 1;
        if label_len == 0 {
            break;
        }
        if label_len >= 0x40 {
            return None;
        }
        pos += label_len;
    }

    let end = pos + 4;
    (end <= query.len()).then_some(end)
}

/// Build a SERVFAIL reply for a query we could not forward.
///
/// Echoes the transaction ID, opcode, RD bit and (when it parses) the
/// question. Datagrams too short to hold a header get a single zero byte,
/// so every query still gets exactly one reply.
pub fn servfail(query: &[u8]) -> Vec<u8> {
    if query.len() < HEADER_LEN {
        return vec![0];
    }

    let query_flags = u16::from_be_bytes([query[2], query[3]]);
    let flags = FLAG_QR | (query_flags & MASK_OPCODE_RD) | FLAG_RA | RCODE_SERVFAIL;
    let question = question_end(query).map(|end| &query[HEADER_LEN..end]);

    let mut response = Vec::with_capacity(HEADER_LEN + question.map_or(0, <[u8]>::len));

    // Header
    response.extend_from_slice(&query[0..2]);
    response.extend_from_slice(&flags.to_be_bytes());
    let qdcount: u16 = if question.is_some() { 1 } else { 0 };
    response.extend_from_slice(&qdcount.to_be_bytes());
    response.extend_from_slice(&[0x00, 0x00]); // ANCOUNT
    response.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    response.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

    if let Some(question) = question {
        response.extend_from_slice(question);
    }

    response
}
