use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::fs;
use std::path::Path;

pub const FOO_DIGEST: &str = "d3b07384d113edec49eaa6238ad5ff00";
pub const BAR_DIGEST: &str = "c157a79031e1c40f85931829bc5fc552";
pub const WRONG_DIGEST: &str = "00000000000000000000000000000000";

pub fn dirhash_cmd(cwd: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("dirhash");
    cmd.arg("-C").arg(cwd);
    cmd
}

// Each integration test file is compiled as its own crate, and not every
// crate needs the fixtures below.
#[allow(dead_code)]
pub fn write_foo_and_bar(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("foo.txt"), "foo\n").unwrap();
    fs::write(dir.join("bar.txt"), "bar\n").unwrap();
}

#[allow(dead_code)]
pub fn checksum_line(digest: &str, name: &str) -> String {
    format!("{digest} *{name}\n")
}

#[allow(dead_code)]
pub fn read_checksums(dir: &Path) -> String {
    fs::read_to_string(dir.join("Checksums.md5")).expect("Checksums.md5 should exist")
}
