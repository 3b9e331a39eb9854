use super::*;

use std::io::Write;

fn tmp_file(name: &str) -> std::path::PathBuf {
    let mut loc = std::env::temp_dir();
    loc.push(format!("odb-util-test-{}-{}", std::process::id(), name));
    loc
}

#[test]
fn test_create_file_a() {
    let loc = tmp_file("create");
    fs::remove_file(&loc).ok();

    let mut fd = create_file_a(loc.as_os_str()).unwrap();
    fd.write_all(b"hello").unwrap();
    drop(fd);

    // creating again truncates the old file
    let fd = create_file_a(loc.as_os_str()).unwrap();
    assert_eq!(fd.metadata().unwrap().len(), 0);
    drop(fd);

    fs::remove_file(&loc).ok();
}

#[test]
fn test_open_file_a() {
    let loc = tmp_file("open");
    fs::remove_file(&loc).ok();

    let (mut fd, n) = open_file_a(loc.as_os_str()).unwrap();
    assert_eq!(n, 0);
    fd.write_all(b"hello").unwrap();
    drop(fd);

    let (_, n) = open_file_a(loc.as_os_str()).unwrap();
    assert_eq!(n, 5);

    fs::remove_file(&loc).ok();
}
