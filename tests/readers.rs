use std::fs::File;
use std::io::Write;
use std::path::Path;

use approx::assert_relative_eq;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusty_psd::data::loader::DEFAULT_XML_ROOT;
use rusty_psd::{from_txt, from_xml, PsdError};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn psd_xml(curves: &[(&str, f64, &[f64])]) -> String {
    let mut xml = String::from(
        "<?xml version='1.0' encoding='utf-8'?>\n<LIGO_LW>\n  <LIGO_LW Name=\"psd\">\n",
    );
    for (ifo, delta_f, values) in curves {
        let rows: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(k, v)| format!("{},{:e}", k as f64 * delta_f, v))
            .collect();
        xml.push_str(&format!(
            "    <LIGO_LW Name=\"REAL8FrequencySeries\">\n\
             \x20     <Param Type=\"lstring\" Name=\"instrument:param\">{ifo}</Param>\n\
             \x20     <Array Type=\"real_8\" Name=\"PSD:array\">\n\
             \x20       <Dim Start=\"0\" Scale=\"{delta_f}\" Name=\"Frequency\">{}</Dim>\n\
             \x20       <Dim Name=\"Frequency,Real\">2</Dim>\n\
             \x20       <Stream Delimiter=\",\" Type=\"Local\">{}</Stream>\n\
             \x20     </Array>\n\
             \x20   </LIGO_LW>\n",
            values.len(),
            rows.join(",\n")
        ));
    }
    xml.push_str("  </LIGO_LW>\n</LIGO_LW>\n");
    xml
}

fn write_text(path: &Path, text: &str) {
    File::create(path).unwrap().write_all(text.as_bytes()).unwrap();
}

#[test]
fn asd_table_is_squared_and_regridded() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("asd.txt");
    let rows: String = (1..=64)
        .map(|k| format!("{} {:e}\n", k as f64 * 4.0, 1e-23 * (k as f64).sqrt()))
        .collect();
    write_text(&path, &format!("# f asd\n{rows}"));

    let psd = from_txt(&path, 129, 2.0, 8.0, true).unwrap();
    assert_eq!(psd.len(), 129);
    assert_eq!(psd.delta_f(), 2.0);
    assert!(psd.data()[..4].iter().all(|&v| v == 0.0));
    // f = 16 Hz is row k = 4: ASD^2 = 1e-46 * 4
    assert_relative_eq!(psd[8], 4e-46, max_relative = 1e-9);

    let as_psd = from_txt(&path, 129, 2.0, 8.0, false).unwrap();
    assert_relative_eq!(as_psd[8], 2e-23, max_relative = 1e-9);
}

#[test]
fn invalid_table_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.txt");
    write_text(&path, "10 1e-23\n20 -1e-23\n");
    match from_txt(&path, 16, 1.0, 10.0, true) {
        Err(PsdError::InvalidData { source_name, .. }) => assert!(source_name.ends_with("bad.txt")),
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn request_beyond_table_shrinks_output() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.txt");
    write_text(&path, "10 1\n20 1\n100 1\n");
    let psd = from_txt(&path, 1024, 1.0, 10.0, false).unwrap();
    assert_eq!(psd.len(), 101);
}

#[test]
fn xml_with_one_curve_needs_no_instrument() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("psd.xml");
    let values: Vec<f64> = (0..65).map(|k| 1e-46 * (1.0 + k as f64)).collect();
    write_text(&path, &psd_xml(&[("V1", 0.5, &values)]));

    let psd = from_xml(&path, 33, 1.0, 4.0, None, Some(DEFAULT_XML_ROOT)).unwrap();
    assert_eq!(psd.len(), 33);
    assert!(psd.data()[..4].iter().all(|&v| v == 0.0));
    // bin 10 (10 Hz) coincides with input bin 20
    assert_relative_eq!(psd[10], values[20], max_relative = 1e-9);
}

#[test]
fn xml_with_several_curves_needs_an_instrument() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("psds.xml.gz");
    let h1: Vec<f64> = vec![1e-46; 33];
    let l1: Vec<f64> = vec![4e-46; 33];
    let mut gz = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    gz.write_all(psd_xml(&[("H1", 1.0, &h1), ("L1", 1.0, &l1)]).as_bytes())
        .unwrap();
    gz.finish().unwrap();

    assert!(matches!(
        from_xml(&path, 16, 1.0, 2.0, None, Some(DEFAULT_XML_ROOT)),
        Err(PsdError::AmbiguousInstrument { available }) if available == vec!["H1", "L1"]
    ));
    assert!(matches!(
        from_xml(&path, 16, 1.0, 2.0, Some("K1"), Some(DEFAULT_XML_ROOT)),
        Err(PsdError::UnknownInstrument { .. })
    ));

    let l1_psd = from_xml(&path, 16, 1.0, 2.0, Some("L1"), Some(DEFAULT_XML_ROOT)).unwrap();
    assert_eq!(l1_psd.len(), 16);
    assert_relative_eq!(l1_psd[5], 4e-46, max_relative = 1e-12);
}
