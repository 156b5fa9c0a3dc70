//! Just enough of the Office Open XML spreadsheet format to round-trip a
//! metadata sheet: the first worksheet is read, a single inline-string sheet
//! is written.
//!
//! Numbers in date-formatted cells are read as `YYYY-MM-DD` (with the time
//! appended when it is not midnight), the way spreadsheet users see them.

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use std::sync::LazyLock;

use chrono::{NaiveDate, TimeDelta};
use regex::Regex;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

use crate::error::PrepError;
use crate::table::Table;

static SHARED_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<si(?:\s[^>]*)?>(.*?)</si>").expect("shared string regex"));
static TEXT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>").expect("text run regex"));
static PHONETIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<rPh\b.*?</rPh>").expect("phonetic regex"));
static SHEET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<sheet\b([^>]*)/?>").expect("sheet regex"));
static RELATIONSHIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Relationship\b([^>]*)/?>").expect("relationship regex"));
static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<row\b([^>]*?)(?:/>|>(.*?)</row>)").expect("row regex")
});
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").expect("cell regex"));
static VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<v(?:\s[^>]*)?>(.*?)</v>").expect("value regex"));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#x[0-9A-Fa-f]+|#[0-9]+|[a-z]+);").expect("entity regex"));

static WORKBOOK_PROPERTIES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<workbookPr\b([^>]*?)/?>").expect("workbook properties regex"));
static NUMBER_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<numFmt\b([^>]*?)/?>").expect("number format regex"));
static CELL_FORMATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<cellXfs\b[^>]*>(.*?)</cellXfs>").expect("cell formats regex")
});
static CELL_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<xf\b([^>]*?)/?>").expect("cell format regex"));

const DEFAULT_SHEET: &str = "xl/worksheets/sheet1.xml";
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;
/// Serial of 9999-12-31, the last date a spreadsheet can hold.
const MAX_DATE_SERIAL: f64 = 2_958_466.0;

pub fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>, PrepError> {
    let file = fs::File::open(path)
        .map_err(|err| PrepError::Filesystem(format!("open {}: {err}", path.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| PrepError::Spreadsheet(format!("{}: {err}", path.display())))?;

    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };
    let workbook = read_entry(&mut archive, "xl/workbook.xml")?;
    let date1904 = workbook
        .as_deref()
        .and_then(|xml| WORKBOOK_PROPERTIES.captures(xml))
        .and_then(|caps| attribute(&caps[1], "date1904"))
        .is_some_and(|value| value == "1" || value == "true");
    let styles = read_entry(&mut archive, "xl/styles.xml")?;
    let dates = DateStyles::parse(styles.as_deref(), date1904);

    let sheet_path = first_sheet_path(&mut archive, workbook.as_deref())?;
    let sheet = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| PrepError::Spreadsheet(format!("missing worksheet {sheet_path}")))?;
    parse_sheet(&sheet, &shared, &dates)
}

pub fn write_sheet(table: &Table) -> Result<Vec<u8>, PrepError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", ROOT_RELS.to_string()),
        ("xl/workbook.xml", WORKBOOK.to_string()),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
        (DEFAULT_SHEET, sheet_xml(table)),
    ];
    for (name, body) in parts {
        writer
            .start_file(name, options)
            .map_err(|err| PrepError::Spreadsheet(err.to_string()))?;
        writer
            .write_all(body.as_bytes())
            .map_err(|err| PrepError::Spreadsheet(err.to_string()))?;
    }
    let cursor = writer
        .finish()
        .map_err(|err| PrepError::Spreadsheet(err.to_string()))?;
    Ok(cursor.into_inner())
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, PrepError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(PrepError::Spreadsheet(format!("{name}: {err}"))),
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|err| PrepError::Spreadsheet(format!("{name}: {err}")))?;
    Ok(Some(content))
}

fn first_sheet_path<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    workbook: Option<&str>,
) -> Result<String, PrepError> {
    let Some(workbook) = workbook else {
        return Ok(DEFAULT_SHEET.to_string());
    };
    let Some(rel_id) = SHEET
        .captures(workbook)
        .and_then(|caps| attribute(&caps[1], "r:id"))
    else {
        return Ok(DEFAULT_SHEET.to_string());
    };
    let Some(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(DEFAULT_SHEET.to_string());
    };
    let target = RELATIONSHIP
        .captures_iter(&rels)
        .filter(|caps| attribute(&caps[1], "Id").as_deref() == Some(rel_id.as_str()))
        .find_map(|caps| attribute(&caps[1], "Target"));
    Ok(match target {
        Some(target) if target.starts_with('/') => target.trim_start_matches('/').to_string(),
        Some(target) => format!("xl/{target}"),
        None => DEFAULT_SHEET.to_string(),
    })
}

fn parse_shared_strings(xml: &str) -> Vec<String> {
    SHARED_STRING
        .captures_iter(xml)
        .map(|caps| {
            let item = PHONETIC.replace_all(&caps[1], "");
            TEXT_RUN
                .captures_iter(&item)
                .map(|run| decode_entities(&run[1]))
                .collect::<String>()
        })
        .collect()
}

/// Number formats of the workbook's cell styles, reduced to "is this a date".
#[derive(Debug, Clone, Default)]
struct DateStyles {
    by_style: Vec<bool>,
    date1904: bool,
}

impl DateStyles {
    fn parse(styles: Option<&str>, date1904: bool) -> Self {
        let Some(xml) = styles else {
            return Self {
                by_style: Vec::new(),
                date1904,
            };
        };
        let custom = NUMBER_FORMAT
            .captures_iter(xml)
            .filter_map(|caps| {
                let id = attribute(&caps[1], "numFmtId")?.parse::<u32>().ok()?;
                Some((id, attribute(&caps[1], "formatCode")?))
            })
            .collect::<HashMap<_, _>>();
        let by_style = CELL_FORMATS
            .captures(xml)
            .map(|formats| {
                CELL_FORMAT
                    .captures_iter(&formats[1])
                    .map(|xf| {
                        let id = attribute(&xf[1], "numFmtId")
                            .and_then(|value| value.parse::<u32>().ok())
                            .unwrap_or(0);
                        match custom.get(&id) {
                            Some(code) => is_date_format(code),
                            None => is_builtin_date_format(id),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { by_style, date1904 }
    }

    fn is_date(&self, style: Option<&str>) -> bool {
        style
            .and_then(|value| value.trim().parse::<usize>().ok())
            .and_then(|idx| self.by_style.get(idx).copied())
            .unwrap_or(false)
    }

    fn render(&self, serial: f64) -> Option<String> {
        if !(0.0..MAX_DATE_SERIAL).contains(&serial) {
            return None;
        }
        let epoch = if self.date1904 {
            NaiveDate::from_ymd_opt(1904, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(1899, 12, 30)?
        };
        let days = serial.trunc();
        let seconds = ((serial - days) * 86_400.0).round() as i64;
        let stamp = epoch.and_hms_opt(0, 0, 0)?
            + TimeDelta::days(days as i64)
            + TimeDelta::seconds(seconds);
        let format = if seconds == 0 {
            "%Y-%m-%d"
        } else {
            "%Y-%m-%d %H:%M:%S"
        };
        Some(stamp.format(format).to_string())
    }
}

/// Built-in date formats, including the East Asian locale ones. Time-only
/// formats (18-21, 45-47) are left as numbers.
fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=17 | 22 | 27..=36 | 50..=58)
}

fn is_date_format(code: &str) -> bool {
    let mut tokens = String::new();
    let mut quoted = false;
    let mut bracketed = false;
    let mut chars = code.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => quoted = !quoted,
            _ if quoted => {}
            '[' => bracketed = true,
            ']' => bracketed = false,
            _ if bracketed => {}
            '\\' | '_' | '*' => {
                chars.next();
            }
            _ => tokens.push(ch.to_ascii_lowercase()),
        }
    }
    tokens.contains(['y', 'd']) || (tokens.contains('m') && !tokens.contains(['h', 's']))
}

fn parse_sheet(
    xml: &str,
    shared: &[String],
    dates: &DateStyles,
) -> Result<Vec<Vec<String>>, PrepError> {
    let mut records: Vec<Vec<String>> = Vec::new();
    for row_caps in ROW.captures_iter(xml) {
        let row_number = attribute(&row_caps[1], "r")
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(records.len() + 1);
        if row_number == 0 {
            continue;
        }
        if row_number > MAX_ROWS {
            return Err(PrepError::Spreadsheet(format!(
                "row {row_number} is beyond the worksheet limit of {MAX_ROWS} rows"
            )));
        }
        let mut record = Vec::new();
        if let Some(body) = row_caps.get(2) {
            for cell_caps in CELL.captures_iter(body.as_str()) {
                let attrs = &cell_caps[1];
                let column = attribute(attrs, "r")
                    .and_then(|reference| column_index(&reference))
                    .unwrap_or(record.len());
                if column >= MAX_COLUMNS {
                    return Err(PrepError::Spreadsheet(format!(
                        "row {row_number} has a cell beyond the worksheet limit of {MAX_COLUMNS} columns"
                    )));
                }
                let body = cell_caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let style = attribute(attrs, "s");
                let value = cell_value(
                    attribute(attrs, "t").as_deref(),
                    style.as_deref(),
                    body,
                    shared,
                    dates,
                );
                if record.len() <= column {
                    record.resize(column + 1, String::new());
                }
                record[column] = value;
            }
        }
        if records.len() < row_number {
            records.resize(row_number, Vec::new());
        }
        records[row_number - 1] = record;
    }
    Ok(records)
}

fn cell_value(
    kind: Option<&str>,
    style: Option<&str>,
    body: &str,
    shared: &[String],
    dates: &DateStyles,
) -> String {
    let raw = VALUE
        .captures(body)
        .map(|caps| decode_entities(&caps[1]))
        .unwrap_or_default();
    match kind {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared.get(idx).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => TEXT_RUN
            .captures_iter(body)
            .map(|run| decode_entities(&run[1]))
            .collect(),
        Some("b") => match raw.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        Some("str") | Some("e") => raw,
        // Numbers are stored as binary floats; print the shortest round-trip form.
        _ => match raw.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => {
                match dates.is_date(style).then(|| dates.render(number)).flatten() {
                    Some(date) => date,
                    None => number.to_string(),
                }
            }
            _ => raw,
        },
    }
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let mut search = attrs;
    while let Some(pos) = search.find(&needle) {
        let preceded_by_space = pos == 0
            || search[..pos]
                .chars()
                .last()
                .map(|ch| ch.is_whitespace())
                .unwrap_or(true);
        let rest = &search[pos + needle.len()..];
        if preceded_by_space {
            return rest.find('"').map(|end| decode_entities(&rest[..end]));
        }
        search = rest;
    }
    None
}

fn column_index(reference: &str) -> Option<usize> {
    let letters = reference
        .chars()
        .take_while(|ch| ch.is_ascii_alphabetic())
        .collect::<String>();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for ch in letters.chars() {
        index = index * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(index - 1)
}

fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16)
                    .ok()
                    .and_then(char::from_u32),
                _ if entity.starts_with('#') => {
                    entity[1..].parse::<u32>().ok().and_then(char::from_u32)
                }
                _ => None,
            };
            decoded
                .map(|ch| ch.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn sheet_xml(table: &Table) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    let rows = std::iter::once(&table.columns).chain(table.rows.iter());
    for (row_idx, row) in rows.enumerate() {
        xml.push_str(&format!("<row r=\"{}\">", row_idx + 1));
        for (col_idx, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            xml.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                column_letters(col_idx),
                row_idx + 1,
                escape_xml(cell)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="metadata" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_references() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_index(&format!("{}1", column_letters(701))), Some(701));
    }

    #[test]
    fn shared_strings_join_rich_text_runs() {
        let xml = r#"<sst><si><t>sample_name</t></si><si><r><t>USA: </t></r><r><t xml:space="preserve">Ohio &amp; more</t></r><rPh><t>x</t></rPh></si></sst>"#;
        assert_eq!(
            parse_shared_strings(xml),
            vec!["sample_name".to_string(), "USA: Ohio & more".to_string()]
        );
    }

    #[test]
    fn sheet_cells_land_in_their_columns() {
        let shared = vec!["sample_name".to_string(), "depth".to_string()];
        let xml = r#"<sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row>
            <row r="3"><c r="A3" t="inlineStr"><is><t>s1</t></is></c><c r="C3"><v>36.951300000000003</v></c></row>
        </sheetData>"#;
        let records = parse_sheet(xml, &shared, &DateStyles::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], vec!["sample_name", "", "depth"]);
        assert!(records[1].is_empty());
        assert_eq!(records[2], vec!["s1", "", "36.9513"]);
    }

    #[test]
    fn date_styles_follow_number_formats() {
        let styles = r#"<styleSheet>
            <numFmts count="2"><numFmt numFmtId="164" formatCode="dd/mm/yyyy;@"/><numFmt numFmtId="165" formatCode="[h]:mm:ss"/></numFmts>
            <cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs>
            <cellXfs count="5"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/><xf numFmtId="164"/><xf numFmtId="165"/><xf numFmtId="20"/></cellXfs>
        </styleSheet>"#;
        let dates = DateStyles::parse(Some(styles), false);
        assert_eq!(dates.by_style, vec![false, true, true, false, false]);
        assert!(!dates.is_date(None));
        assert_eq!(dates.render(44927.0).as_deref(), Some("2023-01-01"));
        assert_eq!(dates.render(45000.5).as_deref(), Some("2023-03-15 12:00:00"));
        assert_eq!(dates.render(-1.0), None);

        let dates = DateStyles::parse(Some(styles), true);
        assert_eq!(dates.render(0.0).as_deref(), Some("1904-01-01"));
    }

    #[test]
    fn quoted_literals_do_not_make_a_date_format() {
        assert!(is_date_format("yyyy-mm-dd"));
        assert!(is_date_format("mmm-yy"));
        assert!(!is_date_format("0.00\"days\""));
        assert!(!is_date_format("mm:ss"));
        assert!(!is_date_format("General"));
    }

    #[test]
    fn oversized_row_reference_is_rejected() {
        let xml = r#"<sheetData><row r="4000000000"><c r="A4000000000"><v>1</v></c></row></sheetData>"#;
        let err = parse_sheet(xml, &[], &DateStyles::default()).unwrap_err();
        assert!(matches!(err, PrepError::Spreadsheet(_)));
        let xml = r#"<sheetData><row r="1"><c r="ZZZZ1"><v>1</v></c></row></sheetData>"#;
        assert!(parse_sheet(xml, &[], &DateStyles::default()).is_err());
    }

    #[test]
    fn written_workbook_reads_back() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("meta.xlsx");
        let mut table = Table::new(vec!["sample_name".to_string(), "title".to_string()]);
        table
            .rows
            .push(vec!["s<1>".to_string(), "gut & stool".to_string()]);
        fs::write(&path, write_sheet(&table).unwrap()).unwrap();

        let records = read_first_sheet(&path).unwrap();
        assert_eq!(records[0], vec!["sample_name", "title"]);
        assert_eq!(records[1], vec!["s<1>", "gut & stool"]);
    }
}
