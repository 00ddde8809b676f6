// TXT builder: the whole reply, encoded, as one character-string

use super::{check_length, double_check_length, RecordBuilder};
use crate::codec::Codec;
use crate::dns::{RData, RecordType};
use crate::TunnelError;

/// Longest single character-string
const MAX_TXT_STRING: usize = 255;

#[derive(Debug, Clone)]
pub struct TxtBuilder {
    codec: Codec,
}

impl TxtBuilder {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }
}

impl RecordBuilder for TxtBuilder {
    fn record_type(&self) -> RecordType {
        RecordType::Txt
    }

    fn max_length(&self) -> usize {
        self.codec.max_decoded_len(MAX_TXT_STRING)
    }

    fn build(&self, data: &[u8]) -> Result<Vec<RData>, TunnelError> {
        log::debug!("TXT: encoding {} bytes", data.len());

        check_length(data, self.max_length())?;

        let records = vec![RData::Txt(self.codec.encode(data).into_bytes())];
        double_check_length(&records)?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_length() {
        assert_eq!(TxtBuilder::new(Codec::Hex).max_length(), 127);
        assert_eq!(TxtBuilder::new(Codec::Base32).max_length(), 159);
    }

    #[test]
    fn test_build() {
        assert_eq!(
            TxtBuilder::new(Codec::Hex).build(b"TXT").unwrap(),
            vec![RData::Txt(b"545854".to_vec())]
        );
        assert_eq!(
            TxtBuilder::new(Codec::Base32).build(b"QWERTY").unwrap(),
            vec![RData::Txt(b"kflukusule".to_vec())]
        );
        assert_eq!(TxtBuilder::new(Codec::Hex).build(b"").unwrap(), vec![RData::Txt(Vec::new())]);
    }

    #[test]
    fn test_full_record_fits_one_string() {
        for codec in Codec::ALL {
            let builder = TxtBuilder::new(codec);
            let records = builder.build(&vec![0xFF; builder.max_length()]).unwrap();
            match &records[0] {
                RData::Txt(text) => assert!(text.len() <= MAX_TXT_STRING),
                other => panic!("expected TXT, got {:?}", other),
            }
            assert!(builder.build(&vec![0xFF; builder.max_length() + 1]).is_err());
        }
    }
}
