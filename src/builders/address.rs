// A and AAAA builders
//
// The reply is prefixed with its length (one byte) and cut into blocks that
// fill an address minus one byte. That first byte is the block's sequence
// number, since resolvers are free to shuffle answers. Short final blocks are
// padded with 0xFF.

use super::{check_length, double_check_length, RecordBuilder, MAX_RR_LENGTH};
use crate::dns::{RData, RecordType};
use crate::TunnelError;
use std::net::{Ipv4Addr, Ipv6Addr};

/// The length prefix is a single byte
const MAX_PREFIXED_LENGTH: usize = u8::MAX as usize;

const PADDING: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn address_len(self) -> usize {
        match self {
            Family::V4 => 4,
            Family::V6 => 16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddressBuilder {
    family: Family,
}

impl AddressBuilder {
    pub fn a() -> Self {
        Self { family: Family::V4 }
    }

    pub fn aaaa() -> Self {
        Self { family: Family::V6 }
    }

    fn to_rdata(&self, octets: &[u8]) -> RData {
        match self.family {
            Family::V4 => RData::A(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])),
            Family::V6 => {
                let mut address = [0u8; 16];
                address.copy_from_slice(octets);
                RData::Aaaa(Ipv6Addr::from(address))
            }
        }
    }
}

impl RecordBuilder for AddressBuilder {
    fn record_type(&self) -> RecordType {
        match self.family {
            Family::V4 => RecordType::A,
            Family::V6 => RecordType::Aaaa,
        }
    }

    fn max_length(&self) -> usize {
        let per_address = self.family.address_len() - 1;
        let addresses = MAX_RR_LENGTH / self.family.address_len();

        // The length prefix takes one byte of the first address
        (per_address - 1) + (addresses - 1) * per_address
    }

    fn build(&self, data: &[u8]) -> Result<Vec<RData>, TunnelError> {
        log::debug!("{}: encoding {} bytes", self.record_type(), data.len());

        check_length(data, self.max_length())?;
        check_length(data, MAX_PREFIXED_LENGTH)?;

        let mut stream = Vec::with_capacity(data.len() + 1);
        stream.push(data.len() as u8);
        stream.extend_from_slice(data);

        let per_address = self.family.address_len() - 1;
        let records: Vec<RData> = stream
            .chunks(per_address)
            .enumerate()
            .map(|(sequence, block)| {
                let mut octets = Vec::with_capacity(self.family.address_len());
                octets.push(sequence as u8);
                octets.extend_from_slice(block);
                octets.resize(self.family.address_len(), PADDING);
                self.to_rdata(&octets)
            })
            .collect();

        double_check_length(&records)?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(records: &[RData]) -> Vec<String> {
        records
            .iter()
            .map(|rdata| match rdata {
                RData::A(addr) => addr.to_string(),
                RData::Aaaa(addr) => addr.to_string(),
                other => panic!("not an address: {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_max_length() {
        assert_eq!(AddressBuilder::a().max_length(), 188);
        assert_eq!(AddressBuilder::aaaa().max_length(), 224);
    }

    #[test]
    fn test_a_blank() {
        let records = AddressBuilder::a().build(b"").unwrap();
        assert_eq!(addresses(&records), vec!["0.0.255.255"]);
    }

    #[test]
    fn test_a_bytes() {
        assert_eq!(addresses(&AddressBuilder::a().build(b"B").unwrap()), vec!["0.1.66.255"]);
        assert_eq!(
            addresses(&AddressBuilder::a().build(b"BBB").unwrap()),
            vec!["0.3.66.66", "1.66.255.255"]
        );
    }

    #[test]
    fn test_a_too_long() {
        let builder = AddressBuilder::a();
        assert_eq!(builder.build(&vec![b'A'; 188]).unwrap().len(), 63);
        assert!(matches!(
            builder.build(&vec![b'A'; 189]),
            Err(TunnelError::PayloadTooLarge { length: 189, max: 188 })
        ));
    }

    #[test]
    fn test_aaaa_blank() {
        let records = AddressBuilder::aaaa().build(b"").unwrap();
        assert_eq!(addresses(&records), vec!["0:ffff:ffff:ffff:ffff:ffff:ffff:ffff"]);
    }

    #[test]
    fn test_aaaa_bytes() {
        let builder = AddressBuilder::aaaa();

        assert_eq!(
            addresses(&builder.build(b"ABCDEFGHIJKLMNOPQRSTUVWXYZ").unwrap()),
            vec![
                "1a:4142:4344:4546:4748:494a:4b4c:4d4e",
                "14f:5051:5253:5455:5657:5859:5aff:ffff",
            ]
        );
        assert_eq!(
            addresses(&builder.build(b"ABCDEFGHIJKLMNO\0\0\0\0\0\0\0\0\0\0\0").unwrap()),
            vec!["1a:4142:4344:4546:4748:494a:4b4c:4d4e", "14f::ff:ffff"]
        );
        assert_eq!(
            addresses(&builder.build(b"A").unwrap()),
            vec!["1:41ff:ffff:ffff:ffff:ffff:ffff:ffff"]
        );
        assert_eq!(
            addresses(&builder.build(&[b'A'; 14]).unwrap()),
            vec!["e:4141:4141:4141:4141:4141:4141:4141"]
        );
    }

    #[test]
    fn test_aaaa_max_length() {
        let builder = AddressBuilder::aaaa();
        let records = addresses(&builder.build(&vec![b'A'; builder.max_length()]).unwrap());

        assert_eq!(records.len(), 15);
        assert_eq!(records[0], "e0:4141:4141:4141:4141:4141:4141:4141");
        for (i, record) in records.iter().enumerate().skip(1) {
            assert_eq!(*record, format!("{:x}41:4141:4141:4141:4141:4141:4141:4141", i));
        }

        assert!(builder.build(&vec![b'A'; builder.max_length() + 1]).is_err());
    }
}
