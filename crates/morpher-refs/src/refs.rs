//! Upload-pack refs advertisement parsing and rewriting
//!
//! The advertisement layout is:
//!
//! ```text
//! 001e# service=git-upload-pack\n
//! 0000
//! 014f<sha> HEAD\0<capabilities>\n
//! 003f<sha> refs/heads/master\n
//! 003d<sha> refs/tags/v1.0.0\n
//! 0040<sha> refs/tags/v1.0.0^{}\n
//! 0000
//! ```
//!
//! Rewriting installs a chosen ref as HEAD (and as `refs/heads/master`)
//! while keeping every other line byte-identical. Clients count bytes
//! against the pkt-line length prefixes, so recomputed lengths must be
//! exact.

use std::collections::HashMap;
use std::ops::Range;

use crate::protocol::{pkt_line, PktEntry, PktLineReader, FLUSH_PKT};
use crate::{Error, Result};

pub const REFS_HEADS: &str = "refs/heads/";
pub const REFS_TAGS: &str = "refs/tags/";

/// Peeled annotated-tag marker
const PEEL_SUFFIX: &str = "^{}";

/// Kind of reference installed as the new head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefType {
    #[default]
    Unknown,
    Branch,
    Tag,
}

/// A payload line following the capability line, kept with its byte
/// range so unrelated lines are re-emitted verbatim
#[derive(Debug, Clone)]
struct RefLine {
    line: Range<usize>,
    /// Ref name exactly as advertised (peel marker included)
    name: String,
}

/// Parsed refs advertisement
#[derive(Debug, Clone)]
pub struct RefsInfo {
    branches: HashMap<String, String>,
    tags: HashMap<String, String>,
    raw: Vec<u8>,
    service_line: Range<usize>,
    head_payload: Vec<u8>,
    ref_lines: Vec<RefLine>,
}

impl RefsInfo {
    /// Parse an advertisement. A well-formed one carries the service
    /// header, a flush, the HEAD capability line and at least one ref
    /// line before the terminator.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = PktLineReader::new(data);
        let mut payloads = Vec::new();

        while let Some(entry) = reader.read()? {
            if let PktEntry::Data { line, payload } = entry {
                payloads.push((line, payload));
            }
        }

        if payloads.len() < 3 {
            return Err(Error::Malformed);
        }

        let mut head_payload = data[payloads[1].1.clone()].to_vec();
        if head_payload.last() == Some(&b'\n') {
            head_payload.pop();
        }

        let mut info = RefsInfo {
            branches: HashMap::new(),
            tags: HashMap::new(),
            raw: data.to_vec(),
            service_line: payloads[0].0.clone(),
            head_payload,
            ref_lines: Vec::with_capacity(payloads.len() - 2),
        };

        for (line, payload) in payloads.into_iter().skip(2) {
            let name = ref_name(&data[payload]).unwrap_or_default();

            info.record(&data[line.clone()]);
            info.ref_lines.push(RefLine { line, name });
        }

        Ok(info)
    }

    /// Record a framed line into the branch/tag maps. The payload is
    /// `<40-hex-sha> <name>\n`, so the sha occupies bytes 4..44 of the
    /// line and the name starts at byte 45. A peeled entry overwrites
    /// the tag object sha recorded for the same name.
    fn record(&mut self, line: &[u8]) {
        if line.len() < 46 {
            return;
        }

        let sha = match std::str::from_utf8(&line[4..44]) {
            Ok(s) => s.to_string(),
            Err(_) => return,
        };

        let mut name = match ref_name(&line[4..]) {
            Some(n) => n,
            None => return,
        };

        if let Some(stripped) = name.strip_suffix(PEEL_SUFFIX) {
            name = stripped.to_string();
        }

        if let Some(tag) = name.strip_prefix(REFS_TAGS) {
            self.tags.insert(tag.to_string(), sha);
        } else if let Some(branch) = name.strip_prefix(REFS_HEADS) {
            self.branches.insert(branch.to_string(), sha);
        }
    }

    /// Original advertisement bytes
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn tag_list(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    pub fn branch_list(&self) -> Vec<String> {
        self.branches.keys().cloned().collect()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    /// SHA for a tag; `short` truncates to the first 8 hex chars
    pub fn tag_sha(&self, name: &str, short: bool) -> Option<String> {
        self.tags.get(name).map(|sha| format_sha(sha, short))
    }

    /// SHA for a branch; `short` truncates to the first 8 hex chars
    pub fn branch_sha(&self, name: &str, short: bool) -> Option<String> {
        self.branches.get(name).map(|sha| format_sha(sha, short))
    }

    /// Return the advertisement with the given ref installed as head.
    ///
    /// An empty head name (or an unknown ref type) returns the original
    /// bytes unchanged.
    pub fn rewrite(&self, head_name: &str, head_type: RefType) -> Vec<u8> {
        if head_name.is_empty() {
            return self.raw.clone();
        }

        let (ref_name, ref_sha) = match head_type {
            RefType::Tag => (
                format!("{REFS_TAGS}{head_name}"),
                self.tags.get(head_name).cloned().unwrap_or_default(),
            ),
            RefType::Branch => (
                format!("{REFS_HEADS}{head_name}"),
                self.branches.get(head_name).cloned().unwrap_or_default(),
            ),
            RefType::Unknown => return self.raw.clone(),
        };

        let mut out = Vec::with_capacity(self.raw.len() + 256);

        out.extend_from_slice(&self.raw[self.service_line.clone()]);
        out.extend_from_slice(&rewrite_head_line(&self.head_payload, &ref_name, &ref_sha));

        for ref_line in &self.ref_lines {
            if ref_line.name == "refs/heads/master" {
                let payload = format!("{ref_sha} refs/heads/master\n");
                out.extend_from_slice(&pkt_line(payload.as_bytes()));
            } else {
                out.extend_from_slice(&self.raw[ref_line.line.clone()]);
            }
        }

        out.extend_from_slice(FLUSH_PKT);

        out
    }
}

/// Extract the ref name from a `<sha> <name>` payload, trailing newline
/// stripped. None when the payload is too short or not valid UTF-8.
fn ref_name(payload: &[u8]) -> Option<String> {
    if payload.len() < 42 {
        return None;
    }

    let mut name = &payload[41..];

    if name.last() == Some(&b'\n') {
        name = &name[..name.len() - 1];
    }

    std::str::from_utf8(name).ok().map(str::to_string)
}

/// Format a (short/long) SHA hash
fn format_sha(sha: &str, short: bool) -> String {
    if short && sha.len() > 8 {
        sha[..8].to_string()
    } else {
        sha.to_string()
    }
}

/// Synthesize the head line: field 0 of the original capability payload
/// is replaced with the resolved sha, `symref=` is rewritten to point at
/// the new head (branch heads only), and the upstream's original symref
/// value is kept observable via an `oldref=` field. The line is emitted
/// behind the flush that separates it from the service header.
fn rewrite_head_line(payload: &[u8], ref_name: &str, ref_sha: &str) -> Vec<u8> {
    let mut fields: Vec<Vec<u8>> = Vec::new();

    for (index, field) in payload.split(|b| *b == b' ').enumerate() {
        if index == 0 {
            fields.push(ref_sha.as_bytes().to_vec());
            continue;
        }

        if let Some(old) = field.strip_prefix(b"symref=") {
            if ref_name.starts_with(REFS_HEADS) {
                fields.push(format!("symref=HEAD:{ref_name}").into_bytes());
            }

            let mut oldref = b"oldref=".to_vec();
            oldref.extend_from_slice(old);
            fields.push(oldref);
            continue;
        }

        fields.push(field.to_vec());
    }

    let mut line = fields.join(&b' ');
    line.push(b'\n');

    let mut out = Vec::with_capacity(line.len() + 8);
    out.extend_from_slice(FLUSH_PKT);
    out.extend_from_slice(format!("{:04x}", line.len() + 4).as_bytes());
    out.extend_from_slice(&line);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "3e4111e9efcaa0e16a652589c75dc98910a79cab";
    const DEVELOP: &str = "daa684d3e025e542e542472df3905fb26e41fc60";
    const V360: &str = "c766ee99f84d21dbd9cceb1ecbc5a6dae956efef";
    const V101_TAG: &str = "50ed24d3fa0f72074f658dbbabd79277e02bacb0";
    const V101: &str = "8c2a3a5610d8a5b93a3fc0540cc78976f74f43a4";

    const CAPS: &str = "multi_ack thin-pack side-band-64k \
                        symref=HEAD:refs/heads/master agent=git/github-g1234";

    fn advert() -> Vec<u8> {
        build_advert(&[
            (MASTER, "refs/heads/master"),
            (DEVELOP, "refs/heads/develop"),
            (V101_TAG, "refs/tags/v1.0.1"),
            (V101, "refs/tags/v1.0.1^{}"),
            (V360, "refs/tags/v3.6.0"),
        ])
    }

    fn build_advert(refs: &[(&str, &str)]) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(&pkt_line(b"# service=git-upload-pack\n"));
        out.extend_from_slice(FLUSH_PKT);
        out.extend_from_slice(&pkt_line(
            format!("{MASTER} HEAD\0{CAPS}\n").as_bytes(),
        ));

        for (sha, name) in refs {
            out.extend_from_slice(&pkt_line(format!("{sha} {name}\n").as_bytes()));
        }

        out.extend_from_slice(FLUSH_PKT);

        out
    }

    fn contains(data: &[u8], needle: &str) -> bool {
        data.windows(needle.len()).any(|w| w == needle.as_bytes())
    }

    #[test]
    fn test_basic_parsing() {
        let info = RefsInfo::parse(&advert()).unwrap();

        assert_eq!(info.branch_list().len(), 2);
        assert_eq!(info.tag_list().len(), 2);

        assert!(info.has_branch("master"));
        assert!(!info.has_branch("unknown"));
        assert_eq!(info.branch_sha("master", true).unwrap(), "3e4111e9");
        assert_eq!(info.branch_sha("master", false).unwrap(), MASTER);

        assert!(info.has_tag("v3.6.0"));
        assert!(!info.has_tag("v0.0.0"));
        assert_eq!(info.tag_sha("v3.6.0", true).unwrap(), "c766ee99");
        assert_eq!(info.tag_sha("v3.6.0", false).unwrap(), V360);
    }

    #[test]
    fn test_peeled_tag_overwrites_tag_object() {
        let info = RefsInfo::parse(&advert()).unwrap();

        // v1.0.1 must resolve to the peeled commit, not the tag object
        assert_eq!(info.tag_sha("v1.0.1", false).unwrap(), V101);
    }

    #[test]
    fn test_malformed_input() {
        assert!(RefsInfo::parse(b"abc\n").is_err());
        assert!(RefsInfo::parse(b"").is_err());
        assert!(RefsInfo::parse(b"0009hello0000").is_err());
    }

    #[test]
    fn test_rewrite_empty_head_returns_input() {
        let data = advert();
        let info = RefsInfo::parse(&data).unwrap();

        assert_eq!(info.rewrite("", RefType::Branch), data);
        assert_eq!(info.rewrite("", RefType::Unknown), data);
    }

    #[test]
    fn test_rewrite_branch() {
        let info = RefsInfo::parse(&advert()).unwrap();
        let out = info.rewrite("develop", RefType::Branch);

        assert!(contains(&out, &format!("{DEVELOP} HEAD")));
        assert!(contains(
            &out,
            "symref=HEAD:refs/heads/develop oldref=HEAD:refs/heads/master",
        ));
        assert!(contains(&out, &format!("{DEVELOP} refs/heads/master")));
        assert_eq!(&out[out.len() - 4..], b"0000");
    }

    #[test]
    fn test_rewrite_tag() {
        let info = RefsInfo::parse(&advert()).unwrap();
        let out = info.rewrite("v3.6.0", RefType::Tag);

        assert!(contains(&out, &format!("{V360} HEAD")));
        assert!(contains(&out, &format!("{V360} refs/heads/master")));
        // A tag head is not a symref; only the old value is kept
        assert!(!contains(&out, "symref=HEAD:refs/tags/v3.6.0"));
        assert!(contains(&out, "oldref=HEAD:refs/heads/master"));
        assert_eq!(&out[out.len() - 4..], b"0000");
    }

    #[test]
    fn test_rewrite_replaces_master_exactly_once() {
        let info = RefsInfo::parse(&advert()).unwrap();
        let out = info.rewrite("v3.6.0", RefType::Tag);

        let needle = format!("{V360} refs/heads/master");
        let hits = out
            .windows(needle.len())
            .filter(|w| *w == needle.as_bytes())
            .count();

        assert_eq!(hits, 1);
        assert!(!contains(&out, &format!("{MASTER} refs/heads/master")));
    }

    #[test]
    fn test_rewrite_lengths_are_exact() {
        let info = RefsInfo::parse(&advert()).unwrap();

        for (name, t) in [
            ("develop", RefType::Branch),
            ("v3.6.0", RefType::Tag),
            ("v1.0.1", RefType::Tag),
        ] {
            let out = info.rewrite(name, t);
            let mut reader = PktLineReader::new(&out);
            let mut entries = 0;

            // Every declared length must frame the buffer exactly
            while reader.read().unwrap().is_some() {
                entries += 1;
            }

            assert!(entries >= 5);
        }
    }

    #[test]
    fn test_rewrite_is_reparseable() {
        let info = RefsInfo::parse(&advert()).unwrap();
        let out = info.rewrite("v3.6.0", RefType::Tag);

        let reparsed = RefsInfo::parse(&out).unwrap();

        assert_eq!(reparsed.branch_sha("master", false).unwrap(), V360);
        assert_eq!(reparsed.rewrite("v3.6.0", RefType::Tag), out);
    }
}
