//! Emission of the viewer's data script and the self-contained page.

use std::io::{self, Write};

use crate::record::LayerRecord;

const DATA_SCRIPT_TAG: &str = r#"<script src="data.js"></script>"#;
const BUNDLE_SCRIPT_TAG: &str = r#"<script src="bundle.js"></script>"#;

/// Write `const data = [...];` with one JSON object per layer.
pub fn write_data<W: Write>(writer: &mut W, records: &[LayerRecord]) -> io::Result<()> {
    writer.write_all(b"const data = [\n")?;
    for record in records {
        serde_json::to_writer(&mut *writer, record).map_err(io::Error::from)?;
        writer.write_all(b",\n")?;
    }
    writer.write_all(b"];\n")
}

/// Fill the page template.
///
/// The title gets ` - <input_name>` appended, and the script tags that load
/// `data.js` and `bundle.js` are replaced by inline scripts. Every other
/// line is copied unchanged.
pub fn write_page<W: Write>(
    writer: &mut W,
    template: &str,
    bundle: &str,
    input_name: &str,
    records: &[LayerRecord],
) -> io::Result<()> {
    let title_end = format!(" - {}</title>", input_name);
    for line in template.split_inclusive('\n') {
        let line = line.replace("</title>", &title_end);
        if line.contains(DATA_SCRIPT_TAG) {
            writer.write_all(b"<script>\n")?;
            write_data(writer, records)?;
            writer.write_all(b"</script>\n")?;
        } else if line.contains(BUNDLE_SCRIPT_TAG) {
            writer.write_all(b"<script>\n")?;
            writer.write_all(bundle.as_bytes())?;
            if !bundle.is_empty() && !bundle.ends_with('\n') {
                writer.write_all(b"\n")?;
            }
            writer.write_all(b"</script>\n")?;
        } else {
            writer.write_all(line.as_bytes())?;
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(layer: &str) -> LayerRecord {
        LayerRecord {
            layer: layer.to_string(),
            name: "m1".to_string(),
            elevation: 1740,
            thickness: 360,
            color: [0.09, 0.45, 0.45, 1.0],
            xy_range: [200, 60],
            xy_nm_per_unit: 1.0,
            points_count: 0,
            points_str: "AQ==".to_string(),
            triangles_points_count: 0,
            triangles_str: "AA==".to_string(),
            edge_counts: [0, 0, 0, 0],
        }
    }

    fn render<F: FnOnce(&mut Vec<u8>) -> io::Result<()>>(f: F) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_empty_data() {
        assert_eq!(render(|w| write_data(w, &[])), "const data = [\n];\n");
    }

    #[test]
    fn test_data_objects() {
        let out = render(|w| write_data(w, &[record("68/20"), record("69/20")]));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with(r#"{"layer":"68/20","name":"m1","elevation":1740"#));
        assert!(lines[1].contains(r#""points_str":"AQ==""#));
        assert!(lines[1].contains(r#""edge_counts":[0,0,0,0]"#));
        assert!(lines[2].ends_with("},"));

        let json = lines[2].trim_end_matches(',');
        let parsed: LayerRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, record("69/20"));
    }

    #[test]
    fn test_page_substitution() {
        let template = concat!(
            "<html><head><title>maskview</title>\n",
            "  <script src=\"data.js\"></script>\n",
            "</head><body>\n",
            "  <script src=\"bundle.js\"></script>\n",
            "</body></html>\n",
        );
        let out = render(|w| write_page(w, template, "main();", "inv.gds", &[record("68/20")]));
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "<html><head><title>maskview - inv.gds</title>");
        assert_eq!(lines[1], "<script>");
        assert_eq!(lines[2], "const data = [");
        assert!(lines[3].starts_with(r#"{"layer":"68/20""#));
        assert_eq!(lines[4], "];");
        assert_eq!(lines[5], "</script>");
        assert_eq!(lines[6], "</head><body>");
        assert_eq!(&lines[7..], &["<script>", "main();", "</script>", "</body></html>"]);
        assert!(!out.contains("src="));
    }
}
