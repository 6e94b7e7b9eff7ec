use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use assert_matches::assert_matches;

use orgtally::config::{DEFAULT_ENDPOINT_TEMPLATE, ResolvedConfig};
use orgtally::domain::Identifier;
use orgtally::error::TallyError;
use orgtally::ncbi::{EfetchHttpClient, TaxonomyClient, build_request_url, parse_tseq_xml};

fn id(value: &str) -> Identifier {
    value.parse().unwrap()
}

#[test]
fn parse_tseq_fixture() {
    let xml = fs::read_to_string("tests/fixtures/tseq_LC012345.xml").unwrap();
    let record = parse_tseq_xml(&id("LC012345.1"), &xml).unwrap();

    assert_eq!(record.identifier.as_str(), "LC012345.1");
    assert_eq!(record.taxonomy_id.as_str(), "8090");
    assert_eq!(record.organism_name, "Oryzias latipes");
}

#[test]
fn missing_taxid_is_an_error() {
    let xml = fs::read_to_string("tests/fixtures/tseq_missing_taxid.xml").unwrap();
    let err = parse_tseq_xml(&id("LC012345.1"), &xml).unwrap_err();
    assert_matches!(err, TallyError::MissingField { field: "TSeq_taxid", .. });
}

#[test]
fn efetch_error_document_is_an_error() {
    let xml = fs::read_to_string("tests/fixtures/efetch_error.xml").unwrap();
    let err = parse_tseq_xml(&id("NOTANID"), &xml).unwrap_err();
    assert_matches!(err, TallyError::MissingField { .. });
}

#[test]
fn empty_orgname_is_missing() {
    let xml = "<TSeqSet><TSeq><TSeq_taxid>8090</TSeq_taxid><TSeq_orgname> </TSeq_orgname></TSeq></TSeqSet>";
    let err = parse_tseq_xml(&id("X"), xml).unwrap_err();
    assert_matches!(err, TallyError::MissingField { field: "TSeq_orgname", .. });
}

#[test]
fn non_numeric_taxid_is_malformed() {
    let xml = "<TSeqSet><TSeq><TSeq_taxid>n/a</TSeq_taxid><TSeq_orgname>Fish</TSeq_orgname></TSeq></TSeqSet>";
    let err = parse_tseq_xml(&id("X"), xml).unwrap_err();
    assert_matches!(err, TallyError::MalformedResponse { .. });
}

#[test]
fn truncated_xml_is_malformed() {
    let err = parse_tseq_xml(&id("X"), "<TSeqSet><TSeq><TSeq_taxid>1").unwrap_err();
    assert_matches!(err, TallyError::MalformedResponse { .. });
}

#[test]
fn escaped_organism_name_is_decoded() {
    let xml = "<TSeqSet><TSeq><TSeq_taxid>1</TSeq_taxid><TSeq_orgname>A &amp; B</TSeq_orgname></TSeq></TSeqSet>";
    let record = parse_tseq_xml(&id("X"), xml).unwrap();
    assert_eq!(record.organism_name, "A & B");
}

#[test]
fn default_request_url() {
    let url = build_request_url(DEFAULT_ENDPOINT_TEMPLATE, &id("AB006953.1_7|x"), None);
    assert_eq!(
        url,
        "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi?db=nuccore&id=AB006953.1&rettype=fasta&retmode=xml"
    );
}

#[test]
fn client_uses_configured_template() {
    let config = ResolvedConfig {
        remote_endpoint_template: "http://127.0.0.1:9/efetch?id={}".to_string(),
        ..ResolvedConfig::default()
    };
    let client = EfetchHttpClient::new(&config).unwrap();
    assert!(
        client
            .request_url(&id("X"))
            .starts_with("http://127.0.0.1:9/efetch?id=X")
    );
}

const TSEQ_BODY: &str = "<TSeqSet><TSeq><TSeq_taxid>10</TSeq_taxid>\
<TSeq_orgname>Org1</TSeq_orgname></TSeq></TSeqSet>";

/// Serves one canned HTTP/1.1 response per accepted connection, in order.
/// The join handle yields the request lines that were received.
fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let request = String::from_utf8_lossy(&buf);
            requests.push(request.lines().next().unwrap_or_default().to_string());
            let response = format!(
                "HTTP/1.1 {status} Canned\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
        }
        requests
    });
    (format!("http://{addr}/efetch?db=nuccore&id={{}}"), handle)
}

fn local_client(template: String, max_retries: usize) -> EfetchHttpClient {
    EfetchHttpClient::new(&ResolvedConfig {
        remote_endpoint_template: template,
        timeout_secs: Some(10),
        max_retries,
        retry_delay_ms: 1,
        ..ResolvedConfig::default()
    })
    .unwrap()
}

#[test]
fn http_success_yields_record() {
    let (template, server) = serve(vec![(200, TSEQ_BODY)]);
    let record = local_client(template, 0).fetch_record(&id("X")).unwrap();

    assert_eq!(record.identifier.as_str(), "X");
    assert_eq!(record.taxonomy_id.as_str(), "10");
    assert_eq!(record.organism_name, "Org1");
    let requests = server.join().unwrap();
    assert!(requests[0].starts_with("GET /efetch?db=nuccore&id=X"));
}

#[test]
fn http_not_found_maps_to_status_error() {
    let (template, server) = serve(vec![(404, "nope")]);
    let err = local_client(template, 0)
        .fetch_record(&id("X"))
        .unwrap_err();

    assert_matches!(err, TallyError::NcbiStatus { status: 404, message } if message == "nope");
    server.join().unwrap();
}

#[test]
fn http_unavailable_is_retried_when_enabled() {
    let (template, server) = serve(vec![(503, "busy"), (200, TSEQ_BODY)]);
    let record = local_client(template, 1).fetch_record(&id("X")).unwrap();

    assert_eq!(record.taxonomy_id.as_str(), "10");
    assert_eq!(server.join().unwrap().len(), 2);
}

#[test]
fn http_unavailable_fails_fast_by_default() {
    let (template, server) = serve(vec![(503, "busy")]);
    let err = local_client(template, 0)
        .fetch_record(&id("X"))
        .unwrap_err();

    assert_matches!(err, TallyError::NcbiStatus { status: 503, .. });
    assert_eq!(server.join().unwrap().len(), 1);
}
