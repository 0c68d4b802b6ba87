use mpg_hardware::{FileEeprom, HwError};
use mpg_traits::NonVolatile;

#[test]
fn new_image_is_created_erased() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mpg.eeprom");
    let store = FileEeprom::open(&path, 64).unwrap();
    assert_eq!(store.capacity(), 64);
    let on_disk = std::fs::read(&path).unwrap();
    assert_eq!(on_disk, vec![0xFF; 64]);
}

#[test]
fn writes_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mpg.eeprom");
    {
        let mut store = FileEeprom::open(&path, 64).unwrap();
        store.write_u32_be(8, 0xDEAD_BEEF).unwrap();
    }
    let store = FileEeprom::open(&path, 64).unwrap();
    assert_eq!(store.read_u32_be(8).unwrap(), 0xDEAD_BEEF);
}

#[test]
fn short_image_is_padded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.eeprom");
    std::fs::write(&path, [1, 2, 3, 4]).unwrap();
    let store = FileEeprom::open(&path, 16).unwrap();
    assert_eq!(store.read_u32_be(0).unwrap(), 0x0102_0304);
    assert_eq!(store.read_u32_be(12).unwrap(), u32::MAX);
}

#[test]
fn oversized_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.eeprom");
    std::fs::write(&path, vec![0u8; 32]).unwrap();
    let err = FileEeprom::open(&path, 16).unwrap_err();
    assert!(matches!(
        err,
        HwError::ImageSize {
            found: 32,
            capacity: 16
        }
    ));
}

#[test]
fn out_of_range_write_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mpg.eeprom");
    let mut store = FileEeprom::open(&path, 8).unwrap();
    assert!(store.write(6, &[0, 0, 0, 0]).is_err());
    assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF; 8]);
}
