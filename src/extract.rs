use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;

use crate::domain::Identifier;
use crate::error::TallyError;

/// Reads BLAST tabular output and returns one identifier per row, in row order.
///
/// The subject id sits in the second tab-separated column. Every physical line is a
/// row: a blank line is a malformed row with zero fields, and only the final newline
/// before EOF is ignored. Quotes carry no meaning since BLAST titles may contain bare `"`.
pub fn extract_identifiers<R: Read>(input: R) -> Result<Vec<Identifier>, TallyError> {
    let reader = BufReader::new(input);

    let mut ids: Vec<Identifier> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| TallyError::InputRead(err.to_string()))?;
        let line_no = index as u64 + 1;
        if line.is_empty() {
            return Err(TallyError::MalformedRow {
                line: line_no,
                fields: 0,
            });
        }
        let mut fields = line.split('\t');
        let subject = fields.nth(1).ok_or(TallyError::MalformedRow {
            line: line_no,
            fields: 1,
        })?;
        ids.push(subject.parse::<Identifier>()?);
    }
    Ok(ids)
}

pub fn read_identifiers(path: &Utf8Path) -> Result<Vec<Identifier>, TallyError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| TallyError::InputRead(format!("open {path}: {err}")))?;
    let is_gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);
    let reader: Box<dyn Read> = if is_gzip {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(file)
    };
    extract_identifiers(reader)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn keeps_order_and_duplicates() {
        let input = "q1\tX_1|p\t99.1\nq2\tX_1|q\t98.0\nq3\tY_5|r\t97.5\n";
        let ids = extract_identifiers(input.as_bytes()).unwrap();
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["X", "X", "Y"]);
    }

    #[test]
    fn single_column_row_is_an_error() {
        let input = "q1\tX_1|p\nq2\n";
        let err = extract_identifiers(input.as_bytes()).unwrap_err();
        assert_matches!(err, TallyError::MalformedRow { line: 2, fields: 1 });
    }

    #[test]
    fn crlf_rows_are_accepted() {
        let input = "q1\tX_1|p\r\nq2\tY_2|p\r\n";
        let ids = extract_identifiers(input.as_bytes()).unwrap();
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["X", "Y"]);
    }
}
