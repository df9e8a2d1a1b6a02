//! The 8-byte generic page header every non-meta page begins with: a
//! logical page id and a reserved LSN placeholder (spec.md §3:
//! "Every page begins with a 4-byte logical page ID and a 4-byte LSN
//! placeholder (reserved, unused by the core)").

use common::PageId;

pub const HEADER_LEN: usize = 8;

pub fn write_header(buf: &mut [u8], page_id: PageId) {
    buf[0..4].copy_from_slice(&page_id.0.to_le_bytes());
    buf[4..8].copy_from_slice(&0u32.to_le_bytes());
}

pub fn read_page_id(buf: &[u8]) -> PageId {
    PageId(u32::from_le_bytes(buf[0..4].try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_page_id() {
        let mut buf = vec![0u8; HEADER_LEN];
        write_header(&mut buf, PageId(42));
        assert_eq!(read_page_id(&buf), PageId(42));
    }
}
