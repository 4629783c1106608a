//! WebDAV XML bodies: request parsing and Multi-Status assembly.
//!
//! PROPFIND/PROPPATCH/LOCK bodies are parsed with a namespace-aware reader;
//! property values are captured as raw inner XML and written back verbatim,
//! so clients get out exactly what they put in. Multi-Status bodies carry
//! the DAV: namespace on the `D:` prefix and declare foreign property
//! namespaces per property element.

use crate::error::{DavError, DavResult};
use crate::headers::percent_encode_path;
use crate::lock::{DavLock, LockScope};
use crate::prop::{DAV_NS, PropName, PropPatch};
use crate::response::DavResponse;
use bytes::Bytes;
use http::StatusCode;
use quick_xml::NsReader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::Writer;

/// What a PROPFIND body asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropfindSpec {
    /// All live and dead properties (empty body or `allprop`).
    AllProp,
    /// Property names only, no values.
    Names,
    /// A specific list of properties.
    Props(Vec<PropName>),
}

/// A parsed LOCK request body.
#[derive(Debug, Clone)]
pub struct LockRequestBody {
    pub exclusive: bool,
    /// Raw inner XML of the `owner` element.
    pub owner: Option<String>,
}

fn reader_for(body: &[u8]) -> NsReader<&[u8]> {
    let mut reader = NsReader::from_reader(body);
    reader.config_mut().trim_text(true);
    reader
}

fn is_dav(ns: &ResolveResult<'_>) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(bytes)) if *bytes == DAV_NS.as_bytes())
}

fn prop_name(ns: &ResolveResult<'_>, local: &[u8]) -> PropName {
    let ns = match ns {
        ResolveResult::Bound(Namespace(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
        _ => String::new(),
    };
    PropName {
        ns,
        name: String::from_utf8_lossy(local).into_owned(),
    }
}

/// Parse a PROPFIND body. An empty body means `allprop`.
pub fn parse_propfind(body: &[u8]) -> DavResult<PropfindSpec> {
    if body_is_blank(body) {
        return Ok(PropfindSpec::AllProp);
    }
    let mut reader = reader_for(body);
    let mut saw_root = false;
    let mut spec: Option<PropfindSpec> = None;

    loop {
        match reader.read_resolved_event().map_err(|_| DavError::BadRequest)? {
            (_, Event::Eof) => break,
            (ns, Event::Empty(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if !saw_root {
                    return Err(DavError::BadRequest);
                }
                match local.as_slice() {
                    b"allprop" if is_dav(&ns) => spec = Some(PropfindSpec::AllProp),
                    b"propname" if is_dav(&ns) => spec = Some(PropfindSpec::Names),
                    // `<D:include/>` and anything else empty carries no data.
                    _ => {}
                }
            }
            (ns, Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if !saw_root {
                    if !is_dav(&ns) || local != b"propfind" {
                        return Err(DavError::BadRequest);
                    }
                    saw_root = true;
                    continue;
                }
                match local.as_slice() {
                    b"allprop" if is_dav(&ns) => spec = Some(PropfindSpec::AllProp),
                    b"propname" if is_dav(&ns) => spec = Some(PropfindSpec::Names),
                    b"prop" if is_dav(&ns) => {
                        spec = Some(PropfindSpec::Props(parse_prop_names(&mut reader)?));
                    }
                    // `include` and anything else is tolerated and skipped.
                    _ => skip_element(&mut reader, &e)?,
                }
            }
            _ => {}
        }
    }
    spec.ok_or(DavError::BadRequest)
}

/// Parse a PROPPATCH body into ordered set/remove instructions.
pub fn parse_proppatch(body: &[u8]) -> DavResult<PropPatch> {
    if body_is_blank(body) {
        return Err(DavError::BadRequest);
    }
    let mut reader = reader_for(body);
    let mut saw_root = false;
    let mut patch = PropPatch::default();

    loop {
        match reader.read_resolved_event().map_err(|_| DavError::BadRequest)? {
            (_, Event::Eof) => break,
            (ns, Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if !saw_root {
                    if !is_dav(&ns) || local != b"propertyupdate" {
                        return Err(DavError::BadRequest);
                    }
                    saw_root = true;
                    continue;
                }
                match local.as_slice() {
                    b"set" if is_dav(&ns) => parse_patch_section(&mut reader, body, &mut patch, true)?,
                    b"remove" if is_dav(&ns) => {
                        parse_patch_section(&mut reader, body, &mut patch, false)?;
                    }
                    _ => skip_element(&mut reader, &e)?,
                }
            }
            (_, Event::Empty(_)) => {
                if !saw_root {
                    return Err(DavError::BadRequest);
                }
            }
            _ => {}
        }
    }
    if patch.is_empty() {
        return Err(DavError::BadRequest);
    }
    Ok(patch)
}

/// Parse a LOCK body; `None` means the request is a refresh (no body).
pub fn parse_lockinfo(body: &[u8]) -> DavResult<Option<LockRequestBody>> {
    if body_is_blank(body) {
        return Ok(None);
    }
    let mut reader = reader_for(body);
    let mut saw_root = false;
    let mut exclusive = true;
    let mut owner = None;

    loop {
        match reader.read_resolved_event().map_err(|_| DavError::BadRequest)? {
            (_, Event::Eof) => break,
            (ns, Event::Empty(e)) => {
                if !saw_root {
                    return Err(DavError::BadRequest);
                }
                match e.local_name().as_ref() {
                    b"exclusive" if is_dav(&ns) => exclusive = true,
                    b"shared" if is_dav(&ns) => exclusive = false,
                    // `<D:write/>` carries no data.
                    _ => {}
                }
            }
            (ns, Event::Start(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if !saw_root {
                    if !is_dav(&ns) || local != b"lockinfo" {
                        return Err(DavError::BadRequest);
                    }
                    saw_root = true;
                    continue;
                }
                match local.as_slice() {
                    b"exclusive" if is_dav(&ns) => exclusive = true,
                    b"shared" if is_dav(&ns) => exclusive = false,
                    b"owner" if is_dav(&ns) => {
                        // The owner value is opaque; keep its raw inner XML.
                        let end = e.to_end().into_owned();
                        let span = reader
                            .read_to_end(end.name())
                            .map_err(|_| DavError::BadRequest)?;
                        let inner = &body[span.start as usize..span.end as usize];
                        let text = String::from_utf8_lossy(inner).trim().to_string();
                        if !text.is_empty() {
                            owner = Some(text);
                        }
                    }
                    // lockscope/locktype wrappers; descend into them.
                    _ => {}
                }
            }
            _ => {}
        }
    }
    Ok(Some(LockRequestBody { exclusive, owner }))
}

fn parse_prop_names(reader: &mut NsReader<&[u8]>) -> DavResult<Vec<PropName>> {
    let mut names = Vec::new();
    loop {
        match reader.read_resolved_event().map_err(|_| DavError::BadRequest)? {
            (_, Event::Eof) => return Err(DavError::BadRequest),
            (ns, Event::Empty(e)) => names.push(prop_name(&ns, e.local_name().as_ref())),
            (ns, Event::Start(e)) => {
                names.push(prop_name(&ns, e.local_name().as_ref()));
                skip_element(reader, &e)?;
            }
            (ns, Event::End(e)) => {
                if is_dav(&ns) && e.local_name().as_ref() == b"prop" {
                    return Ok(names);
                }
            }
            _ => {}
        }
    }
}

/// Parse one `set` or `remove` section of a PROPPATCH body.
fn parse_patch_section(
    reader: &mut NsReader<&[u8]>,
    body: &[u8],
    patch: &mut PropPatch,
    is_set: bool,
) -> DavResult<()> {
    let section: &[u8] = if is_set { b"set" } else { b"remove" };
    loop {
        match reader.read_resolved_event().map_err(|_| DavError::BadRequest)? {
            (_, Event::Eof) => return Err(DavError::BadRequest),
            (ns, Event::Empty(e)) => {
                let name = prop_name(&ns, e.local_name().as_ref());
                if name.name == "prop" && name.ns == DAV_NS {
                    continue;
                }
                if is_set {
                    patch.set.push((name, String::new()));
                } else {
                    patch.remove.push(name);
                }
            }
            (ns, Event::Start(e)) => {
                let name = prop_name(&ns, e.local_name().as_ref());
                if name.name == "prop" && name.ns == DAV_NS {
                    continue;
                }
                let end = e.to_end().into_owned();
                let span = reader
                    .read_to_end(end.name())
                    .map_err(|_| DavError::BadRequest)?;
                if is_set {
                    let inner = &body[span.start as usize..span.end as usize];
                    patch
                        .set
                        .push((name, String::from_utf8_lossy(inner).trim().to_string()));
                } else {
                    patch.remove.push(name);
                }
            }
            (ns, Event::End(e)) => {
                if is_dav(&ns) && e.local_name().as_ref() == section {
                    return Ok(());
                }
            }
            _ => {}
        }
    }
}

fn skip_element(reader: &mut NsReader<&[u8]>, start: &BytesStart<'_>) -> DavResult<()> {
    let end = start.to_end().into_owned();
    reader
        .read_to_end(end.name())
        .map_err(|_| DavError::BadRequest)?;
    Ok(())
}

fn body_is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// A property rendered into a Multi-Status body.
#[derive(Debug, Clone)]
pub struct RenderedProp {
    pub name: PropName,
    /// Raw inner XML; `None` renders an empty element.
    pub inner: Option<String>,
}

/// One `propstat` group: all properties sharing a status.
#[derive(Debug, Clone)]
pub struct PropstatGroup {
    pub status: StatusCode,
    pub props: Vec<RenderedProp>,
}

enum MsEntry {
    Status {
        href: String,
        status: StatusCode,
    },
    Propstat {
        href: String,
        groups: Vec<PropstatGroup>,
    },
}

/// Builder for a 207 Multi-Status body: one entry per affected resource.
pub struct MultiStatus {
    entries: Vec<MsEntry>,
}

impl MultiStatus {
    pub fn new() -> Self {
        MultiStatus { entries: Vec::new() }
    }

    /// Whether any entry has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Record a plain per-resource status (DELETE/COPY/MOVE failures).
    pub fn push_status(&mut self, href: &str, status: StatusCode) {
        self.entries.push(MsEntry::Status {
            href: href.to_string(),
            status,
        });
    }

    /// Record per-property outcomes for one resource.
    pub fn push_propstat(&mut self, href: &str, groups: Vec<PropstatGroup>) {
        self.entries.push(MsEntry::Propstat {
            href: href.to_string(),
            groups,
        });
    }

    /// Render the 207 response.
    pub fn into_response(self) -> DavResult<DavResponse> {
        let mut writer = Writer::new(Vec::new());
        write_event(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut root = BytesStart::new("D:multistatus");
        root.push_attribute(("xmlns:D", DAV_NS));
        write_event(&mut writer, Event::Start(root))?;

        for entry in &self.entries {
            write_event(&mut writer, Event::Start(BytesStart::new("D:response")))?;
            match entry {
                MsEntry::Status { href, status } => {
                    write_href(&mut writer, href)?;
                    write_status(&mut writer, *status)?;
                }
                MsEntry::Propstat { href, groups } => {
                    write_href(&mut writer, href)?;
                    for group in groups {
                        if group.props.is_empty() {
                            continue;
                        }
                        write_event(&mut writer, Event::Start(BytesStart::new("D:propstat")))?;
                        write_event(&mut writer, Event::Start(BytesStart::new("D:prop")))?;
                        for prop in &group.props {
                            write_prop(&mut writer, prop)?;
                        }
                        write_event(&mut writer, Event::End(BytesEnd::new("D:prop")))?;
                        write_status(&mut writer, group.status)?;
                        write_event(&mut writer, Event::End(BytesEnd::new("D:propstat")))?;
                    }
                }
            }
            write_event(&mut writer, Event::End(BytesEnd::new("D:response")))?;
        }

        write_event(&mut writer, Event::End(BytesEnd::new("D:multistatus")))?;
        Ok(DavResponse::xml(
            StatusCode::MULTI_STATUS,
            Bytes::from(writer.into_inner()),
        ))
    }
}

impl Default for MultiStatus {
    fn default() -> Self {
        MultiStatus::new()
    }
}

type XmlWriter = Writer<Vec<u8>>;

fn write_event(writer: &mut XmlWriter, event: Event<'_>) -> DavResult<()> {
    writer.write_event(event).map_err(|_| DavError::Internal)
}

fn write_href(writer: &mut XmlWriter, href: &str) -> DavResult<()> {
    write_event(writer, Event::Start(BytesStart::new("D:href")))?;
    write_event(
        writer,
        Event::Text(BytesText::new(&percent_encode_path(href))),
    )?;
    write_event(writer, Event::End(BytesEnd::new("D:href")))
}

fn write_status(writer: &mut XmlWriter, status: StatusCode) -> DavResult<()> {
    write_event(writer, Event::Start(BytesStart::new("D:status")))?;
    write_event(writer, Event::Text(BytesText::new(&status_line(status))))?;
    write_event(writer, Event::End(BytesEnd::new("D:status")))
}

fn write_prop(writer: &mut XmlWriter, prop: &RenderedProp) -> DavResult<()> {
    let (tag, xmlns): (String, Option<(&str, &str)>) = if prop.name.ns == DAV_NS {
        (format!("D:{}", prop.name.name), None)
    } else if prop.name.ns.is_empty() {
        (prop.name.name.clone(), None)
    } else {
        (format!("V:{}", prop.name.name), Some(("xmlns:V", prop.name.ns.as_str())))
    };
    let mut start = BytesStart::new(tag.as_str());
    if let Some(attr) = xmlns {
        start.push_attribute(attr);
    }
    match prop.inner.as_deref() {
        None | Some("") => write_event(writer, Event::Empty(start)),
        Some(inner) => {
            write_event(writer, Event::Start(start))?;
            write_event(writer, Event::Text(BytesText::from_escaped(inner)))?;
            write_event(writer, Event::End(BytesEnd::new(tag.as_str())))
        }
    }
}

/// `HTTP/1.1 207 Multi-Status` style status line.
pub fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Status")
    )
}

/// Render the inner XML of a `lockdiscovery` element.
pub fn render_lockdiscovery(locks: &[DavLock]) -> String {
    let mut out = String::new();
    for lock in locks {
        let scope = match lock.scope {
            LockScope::Exclusive => "<D:exclusive/>",
            LockScope::Shared => "<D:shared/>",
        };
        let depth = if lock.deep { "infinity" } else { "0" };
        out.push_str("<D:activelock>");
        out.push_str("<D:locktype><D:write/></D:locktype>");
        out.push_str(&format!("<D:lockscope>{scope}</D:lockscope>"));
        out.push_str(&format!("<D:depth>{depth}</D:depth>"));
        if let Some(owner) = &lock.owner {
            out.push_str(&format!("<D:owner>{owner}</D:owner>"));
        }
        out.push_str(&format!("<D:timeout>Second-{}</D:timeout>", lock.timeout_secs));
        out.push_str(&format!(
            "<D:locktoken><D:href>{}</D:href></D:locktoken>",
            escape(&lock.token)
        ));
        out.push_str(&format!(
            "<D:lockroot><D:href>{}</D:href></D:lockroot>",
            escape(&percent_encode_path(&lock.path.as_url()))
        ));
        out.push_str("</D:activelock>");
    }
    out
}

/// The body of a successful LOCK response.
pub fn lock_response_body(lock: &DavLock) -> Bytes {
    let discovery = render_lockdiscovery(std::slice::from_ref(lock));
    Bytes::from(format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <D:prop xmlns:D=\"DAV:\"><D:lockdiscovery>{discovery}</D:lockdiscovery></D:prop>"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use davgate_core::DavPath;
    use std::time::{Duration, Instant};

    #[test]
    fn test_parse_propfind_allprop() {
        assert_eq!(parse_propfind(b"").unwrap(), PropfindSpec::AllProp);
        let body = br#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        assert_eq!(parse_propfind(body).unwrap(), PropfindSpec::AllProp);
    }

    #[test]
    fn test_parse_propfind_named_props() {
        let body = br#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:" xmlns:z="urn:zoo">
              <D:prop><D:getcontentlength/><z:species/></D:prop>
            </D:propfind>"#;
        let PropfindSpec::Props(names) = parse_propfind(body).unwrap() else {
            panic!("expected props");
        };
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], PropName::dav("getcontentlength"));
        assert_eq!(names[1], PropName::new("urn:zoo", "species"));
    }

    #[test]
    fn test_parse_propfind_propname() {
        let body = br#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
        assert_eq!(parse_propfind(body).unwrap(), PropfindSpec::Names);
    }

    #[test]
    fn test_parse_propfind_rejects_garbage() {
        assert!(parse_propfind(b"<not-xml").is_err());
        assert!(parse_propfind(b"<wrong-root/>").is_err());
    }

    #[test]
    fn test_parse_proppatch() {
        let body = br#"<?xml version="1.0"?>
            <D:propertyupdate xmlns:D="DAV:" xmlns:z="urn:zoo">
              <D:set><D:prop><z:species>otter</z:species></D:prop></D:set>
              <D:remove><D:prop><z:extinct/></D:prop></D:remove>
            </D:propertyupdate>"#;
        let patch = parse_proppatch(body).unwrap();
        assert_eq!(patch.set.len(), 1);
        assert_eq!(patch.set[0].0, PropName::new("urn:zoo", "species"));
        assert_eq!(patch.set[0].1, "otter");
        assert_eq!(patch.remove, vec![PropName::new("urn:zoo", "extinct")]);
    }

    #[test]
    fn test_parse_proppatch_preserves_nested_value() {
        let body = br#"<D:propertyupdate xmlns:D="DAV:" xmlns:z="urn:zoo">
              <D:set><D:prop><z:nest><z:egg>1</z:egg></z:nest></D:prop></D:set>
            </D:propertyupdate>"#;
        let patch = parse_proppatch(body).unwrap();
        assert_eq!(patch.set[0].1, "<z:egg>1</z:egg>");
    }

    #[test]
    fn test_parse_proppatch_rejects_empty() {
        assert!(parse_proppatch(b"").is_err());
        let body = br#"<D:propertyupdate xmlns:D="DAV:"/>"#;
        assert!(parse_proppatch(body).is_err());
    }

    #[test]
    fn test_parse_lockinfo() {
        let body = br#"<?xml version="1.0"?>
            <D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:exclusive/></D:lockscope>
              <D:locktype><D:write/></D:locktype>
              <D:owner><D:href>mailto:alice@example.net</D:href></D:owner>
            </D:lockinfo>"#;
        let parsed = parse_lockinfo(body).unwrap().unwrap();
        assert!(parsed.exclusive);
        assert_eq!(
            parsed.owner.as_deref(),
            Some("<D:href>mailto:alice@example.net</D:href>")
        );

        let shared = br#"<D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:shared/></D:lockscope>
              <D:locktype><D:write/></D:locktype>
            </D:lockinfo>"#;
        let parsed = parse_lockinfo(shared).unwrap().unwrap();
        assert!(!parsed.exclusive);
        assert!(parsed.owner.is_none());
    }

    #[test]
    fn test_parse_lockinfo_empty_is_refresh() {
        assert!(parse_lockinfo(b"").unwrap().is_none());
        assert!(parse_lockinfo(b"   \n").unwrap().is_none());
    }

    #[test]
    fn test_multistatus_body_shape() {
        let mut ms = MultiStatus::new();
        ms.push_status("/a b", StatusCode::FORBIDDEN);
        ms.push_propstat(
            "/x",
            vec![PropstatGroup {
                status: StatusCode::OK,
                props: vec![
                    RenderedProp {
                        name: PropName::dav("getcontentlength"),
                        inner: Some("5".to_string()),
                    },
                    RenderedProp {
                        name: PropName::new("urn:zoo", "species"),
                        inner: None,
                    },
                ],
            }],
        );
        let response = ms.into_response().unwrap();
        assert_eq!(response.status, StatusCode::MULTI_STATUS);
        let crate::response::DavBody::Full(body) = response.body else {
            panic!("expected buffered body");
        };
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("<D:multistatus xmlns:D=\"DAV:\">"));
        assert!(body.contains("<D:href>/a%20b</D:href>"));
        assert!(body.contains("HTTP/1.1 403 Forbidden"));
        assert!(body.contains("<D:getcontentlength>5</D:getcontentlength>"));
        assert!(body.contains("<V:species xmlns:V=\"urn:zoo\"/>"));
    }

    #[test]
    fn test_lockdiscovery_rendering() {
        let lock = DavLock {
            token: "opaquelocktoken:abc".to_string(),
            scope: LockScope::Exclusive,
            deep: true,
            owner: Some("<D:href>alice</D:href>".to_string()),
            path: DavPath::parse("/dir").unwrap(),
            expires: Instant::now() + Duration::from_secs(60),
            timeout_secs: 60,
        };
        let xml = render_lockdiscovery(std::slice::from_ref(&lock));
        assert!(xml.contains("<D:exclusive/>"));
        assert!(xml.contains("<D:depth>infinity</D:depth>"));
        assert!(xml.contains("<D:timeout>Second-60</D:timeout>"));
        assert!(xml.contains("opaquelocktoken:abc"));
        assert!(xml.contains("<D:owner><D:href>alice</D:href></D:owner>"));
    }
}
