use std::fs::{self, File};
use std::path::Path;

use maskview_cli::{convert, Conversion};
use maskview_core::geometry::Point;
use maskview_io::{Element, GdsCell, GdsLibrary, GdsWriter, Strans};
use maskview_render::{decode, LayerRecord};

fn rect(layer: u16, datatype: u16, x0: i32, y0: i32, x1: i32, y1: i32) -> Element {
    Element::Boundary {
        layer,
        datatype,
        points: vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ],
    }
}

/// An L-shaped m1 wire drawn as two overlapping rectangles plus one via
/// placed through a reference.
fn fixture_library() -> GdsLibrary {
    let mut lib = GdsLibrary::new("fixture");

    let mut via = GdsCell::new("via_cell");
    via.add_element(rect(68, 44, 0, 0, 10, 10));
    lib.add_cell(via);

    let mut top = GdsCell::new("top");
    top.add_element(rect(68, 20, 0, 0, 100, 20));
    top.add_element(rect(68, 20, 0, 0, 20, 60));
    top.add_element(Element::Sref {
        cell: "via_cell".into(),
        strans: Strans::default(),
        origin: Point::new(40, 5),
    });
    lib.add_cell(top);
    lib
}

fn write_gds(path: &Path, lib: &GdsLibrary) {
    let file = File::create(path).unwrap();
    GdsWriter::new(file).write(lib).unwrap();
}

fn parse_records(script: &str) -> Vec<LayerRecord> {
    let lines: Vec<&str> = script.lines().collect();
    assert_eq!(lines.first(), Some(&"const data = ["));
    assert_eq!(lines.last(), Some(&"];"));
    lines[1..lines.len() - 1]
        .iter()
        .map(|line| serde_json::from_str(line.trim_end_matches(',')).unwrap())
        .collect()
}

fn find<'a>(records: &'a [LayerRecord], key: &str) -> &'a LayerRecord {
    records.iter().find(|r| r.layer == key).unwrap()
}

#[test]
fn test_data_script_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fixture.gds");
    let output = dir.path().join("data.js");
    write_gds(&input, &fixture_library());

    convert(&Conversion::new(&input, &output)).unwrap();

    let records = parse_records(&fs::read_to_string(&output).unwrap());
    assert_eq!(records.len(), 19);
    assert!(records.iter().all(|r| r.xy_range == [100, 60]));

    let m1 = find(&records, "68/20");
    assert_eq!(m1.name, "m1");
    assert_eq!(m1.points_count, 6);
    assert_eq!(m1.edge_counts, [1, 2, 2, 1]);
    assert_eq!(m1.triangles_points_count, 12);
    let stream = decode(&base64_decode(&m1.points_str)).unwrap();
    assert_eq!(stream, vec![6, 0, 0, 100, 20, -80, 40, -20]);

    let via = find(&records, "68/44");
    assert_eq!(via.points_count, 4);
    assert_eq!(
        decode(&base64_decode(&via.points_str)).unwrap(),
        vec![4, 40, 5, 10, 10, -10]
    );

    let poly = find(&records, "66/20");
    assert_eq!(poly.points_str, "AQ==");
    assert_eq!(poly.triangles_str, "AA==");
}

#[test]
fn test_page_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fixture.gds");
    let output = dir.path().join("view.html");
    write_gds(&input, &fixture_library());
    fs::write(
        dir.path().join("index.html"),
        "<title>maskview</title>\n<script src=\"data.js\"></script>\n<script src=\"bundle.js\"></script>\n",
    )
    .unwrap();
    fs::write(dir.path().join("bundle.js"), "start();\n").unwrap();

    convert(&Conversion::new(&input, &output).with_assets_dir(dir.path())).unwrap();

    let page = fs::read_to_string(&output).unwrap();
    assert!(page.starts_with(&format!("<title>maskview - {}</title>\n", input.display())));
    assert!(page.contains("<script>\nconst data = [\n"));
    assert!(page.ends_with("<script>\nstart();\n</script>\n"));
}

#[test]
fn test_page_output_requires_template() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("fixture.gds");
    write_gds(&input, &fixture_library());

    let conversion = Conversion::new(&input, dir.path().join("view.html")).with_assets_dir(dir.path());
    let err = convert(&conversion).unwrap_err();
    assert!(err.to_string().contains("index.html"));
}

#[test]
fn test_diagonal_geometry_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.gds");
    let mut lib = GdsLibrary::new("bad");
    let mut top = GdsCell::new("top");
    top.add_element(Element::Boundary {
        layer: 68,
        datatype: 20,
        points: vec![Point::new(0, 0), Point::new(10, 0), Point::new(0, 10)],
    });
    lib.add_cell(top);
    write_gds(&input, &lib);

    let output = dir.path().join("data.js");
    let err = convert(&Conversion::new(&input, &output)).unwrap_err();
    assert!(err.to_string().contains("68/20"));
    assert!(!output.exists());
}

fn base64_decode(s: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).unwrap()
}
