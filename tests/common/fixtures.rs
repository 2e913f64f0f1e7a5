//! IPA fixtures

use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// Bundle id baked into [`write_ipa`] artifacts
pub const BUNDLE_ID: &str = "com.example.testapp";
/// Build number baked into [`write_ipa`] artifacts
pub const BUILD_NUMBER: &str = "42";
/// Short version baked into [`write_ipa`] artifacts
pub const SHORT_VERSION: &str = "2.1.0";

/// Info.plist for the fixture app
pub fn info_plist(bundle_id: &str, build_number: &str, short_version: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>CFBundleIdentifier</key><string>{}</string>
  <key>CFBundleVersion</key><string>{}</string>
  <key>CFBundleShortVersionString</key><string>{}</string>
  <key>CFBundleName</key><string>TestApp</string>
</dict>
</plist>"#,
        bundle_id, build_number, short_version
    )
}

/// Write `TestApp.ipa` into `dir` and return its path
///
/// The archive carries a stored (uncompressed) executable of `payload_len`
/// pseudo-random bytes so the artifact is large enough to split into chunks.
pub fn write_ipa(dir: &TempDir, payload_len: usize) -> PathBuf {
    let path = dir.path().join("TestApp.ipa");
    let file = std::fs::File::create(&path).expect("create ipa");
    let mut zip = zip::ZipWriter::new(file);
    let stored =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("Payload/TestApp.app/Info.plist", stored)
        .expect("start plist");
    zip.write_all(info_plist(BUNDLE_ID, BUILD_NUMBER, SHORT_VERSION).as_bytes())
        .expect("write plist");

    zip.start_file("Payload/TestApp.app/TestApp", stored)
        .expect("start binary");
    let payload: Vec<u8> = (0..payload_len)
        .map(|i| (i.wrapping_mul(31) % 251) as u8)
        .collect();
    zip.write_all(&payload).expect("write binary");

    zip.finish().expect("finish ipa");
    path
}
