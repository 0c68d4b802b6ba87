type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Byte-addressed non-volatile store (EEPROM-like).
///
/// Multi-byte helpers are big-endian, the layout trip and settings images use.
pub trait NonVolatile {
    fn capacity(&self) -> usize;
    fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), BoxError>;
    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), BoxError>;

    fn read_u32_be(&self, addr: usize) -> Result<u32, BoxError> {
        let mut b = [0u8; 4];
        self.read(addr, &mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn write_u32_be(&mut self, addr: usize, value: u32) -> Result<(), BoxError> {
        self.write(addr, &value.to_be_bytes())
    }
}

#[cfg(test)]
pub mod test_store {
    use super::*;

    /// Vec-backed store with bounds checking.
    #[derive(Debug, Clone)]
    pub struct VecStore(pub Vec<u8>);

    impl NonVolatile for VecStore {
        fn capacity(&self) -> usize {
            self.0.len()
        }

        fn read(&self, addr: usize, buf: &mut [u8]) -> Result<(), BoxError> {
            let src = self
                .0
                .get(addr..addr + buf.len())
                .ok_or("read out of range")?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), BoxError> {
            let dst = self
                .0
                .get_mut(addr..addr + data.len())
                .ok_or("write out of range")?;
            dst.copy_from_slice(data);
            Ok(())
        }
    }

    #[test]
    fn u32_helpers_are_big_endian() {
        let mut s = VecStore(vec![0; 8]);
        s.write_u32_be(2, 0x0102_0304).unwrap();
        assert_eq!(&s.0[2..6], &[1, 2, 3, 4]);
        assert_eq!(s.read_u32_be(2).unwrap(), 0x0102_0304);
    }

    #[test]
    fn out_of_range_is_an_error() {
        let s = VecStore(vec![0; 4]);
        assert!(s.read_u32_be(2).is_err());
    }
}
