// Record builders: pack a sink's reply into answer RDATA
//
// A and AAAA pack raw bytes into addresses and don't care about the codec.
// CNAME, MX and NS encode into a name through a NameBudget. TXT encodes the
// whole reply into one string.

mod address;
mod name;
mod txt;

pub use address::AddressBuilder;
pub use name::NameBuilder;
pub use txt::TxtBuilder;

use crate::dns::{RData, RecordType};
use crate::name_budget::NameBudget;
use crate::random::Randomness;
use crate::TunnelError;
use bytes::BytesMut;

/// Longest name on the wire, trailing NUL included
pub const MAX_NAME_LENGTH: usize = 254;

/// Byte budget for the records of one A/AAAA answer
pub const MAX_RR_LENGTH: usize = 253;

/// Ceiling for a single packed RDATA in the post-build check.
///
/// Well-formed maximal records stay under it: TXT packs to 256 bytes and a
/// full name to 254.
pub const MAX_PACKED_RR_LENGTH: usize = 300;

/// Types the driver can answer
pub const SUPPORTED_TYPES: [RecordType; 6] = [
    RecordType::A,
    RecordType::Aaaa,
    RecordType::Cname,
    RecordType::Mx,
    RecordType::Ns,
    RecordType::Txt,
];

/// What an ANY question gets answered with. AAAA is left out.
pub const ANY_CANDIDATES: [RecordType; 5] = [
    RecordType::A,
    RecordType::Cname,
    RecordType::Mx,
    RecordType::Ns,
    RecordType::Txt,
];

pub const MX_PREFERENCES: [u16; 5] = [10, 20, 30, 40, 50];

/// Turns a reply into the RDATA of one answer
pub trait RecordBuilder: Send + Sync {
    fn record_type(&self) -> RecordType;

    /// Largest reply `build` accepts; a pure function of configuration
    fn max_length(&self) -> usize;

    fn build(&self, data: &[u8]) -> Result<Vec<RData>, TunnelError>;
}

/// Builder for `rtype`, configured from the matched route.
///
/// MX preferences are drawn from `randomness` here, once per builder.
pub fn for_type(
    rtype: RecordType,
    budget: NameBudget,
    randomness: &dyn Randomness,
) -> Result<Box<dyn RecordBuilder>, TunnelError> {
    let builder: Box<dyn RecordBuilder> = match rtype {
        RecordType::A => Box::new(AddressBuilder::a()),
        RecordType::Aaaa => Box::new(AddressBuilder::aaaa()),
        RecordType::Cname => Box::new(NameBuilder::cname(budget)),
        RecordType::Ns => Box::new(NameBuilder::ns(budget)),
        RecordType::Mx => {
            let preference = MX_PREFERENCES[randomness.choose_index(MX_PREFERENCES.len())];
            Box::new(NameBuilder::mx(budget, preference))
        }
        RecordType::Txt => Box::new(TxtBuilder::new(budget.codec())),
        other => return Err(TunnelError::UnsupportedRecordType(other)),
    };

    Ok(builder)
}

pub(crate) fn check_length(data: &[u8], max: usize) -> Result<(), TunnelError> {
    if data.len() > max {
        return Err(TunnelError::PayloadTooLarge {
            length: data.len(),
            max,
        });
    }
    Ok(())
}

/// Pack each RDATA and make sure it came out within `MAX_PACKED_RR_LENGTH`.
///
/// Failing here means a budget calculation is wrong.
pub fn double_check_length(records: &[RData]) -> Result<(), TunnelError> {
    for rdata in records {
        let mut packed = BytesMut::new();
        rdata.pack(&mut packed).map_err(|e| {
            TunnelError::InternalInvariantViolation(format!("couldn't pack {:?}: {}", rdata, e))
        })?;

        if packed.len() > MAX_PACKED_RR_LENGTH {
            return Err(TunnelError::InternalInvariantViolation(format!(
                "packed {} bytes, max is {}",
                packed.len(),
                MAX_PACKED_RR_LENGTH
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::random::SequenceRandomness;

    fn plain_budget() -> NameBudget {
        NameBudget::new(None, None, 63, Codec::Hex).unwrap()
    }

    #[test]
    fn test_for_type() {
        let rng = SequenceRandomness::new(vec![0]);
        for rtype in SUPPORTED_TYPES {
            let builder = for_type(rtype, plain_budget(), &rng).unwrap();
            assert_eq!(builder.record_type(), rtype);
        }

        assert!(matches!(
            for_type(RecordType::Soa, plain_budget(), &rng),
            Err(TunnelError::UnsupportedRecordType(RecordType::Soa))
        ));
        assert!(for_type(RecordType::Any, plain_budget(), &rng).is_err());
    }

    #[test]
    fn test_mx_preference_comes_from_randomness() {
        let rng = SequenceRandomness::new(vec![3]);
        let builder = for_type(RecordType::Mx, plain_budget(), &rng).unwrap();
        match &builder.build(b"A").unwrap()[0] {
            RData::Mx { preference, exchange } => {
                assert_eq!(*preference, 40);
                assert_eq!(exchange, "41");
            }
            other => panic!("expected MX, got {:?}", other),
        }
    }

    #[test]
    fn test_max_length_builds_for_every_type() {
        let rng = SequenceRandomness::new(vec![1]);
        for codec in Codec::ALL {
            for rtype in SUPPORTED_TYPES {
                let budget = NameBudget::new(None, Some("example.com".into()), 63, codec).unwrap();
                let builder = for_type(rtype, budget, &rng).unwrap();
                let data = vec![0xA5u8; builder.max_length()];
                assert!(builder.build(&data).is_ok(), "{} {}", rtype, codec);
                assert!(builder.build(&[data, vec![0]].concat()).is_err());
            }
        }
    }

    #[test]
    fn test_double_check_length() {
        assert!(double_check_length(&[RData::Txt(vec![b'a'; 255])]).is_ok());
        assert!(double_check_length(&[RData::Cname("a".repeat(63))]).is_ok());

        assert!(matches!(
            double_check_length(&[RData::Unknown(vec![0; MAX_PACKED_RR_LENGTH + 1])]),
            Err(TunnelError::InternalInvariantViolation(_))
        ));
        // A label over 63 characters can't be packed at all
        assert!(matches!(
            double_check_length(&[RData::Ns("a".repeat(64))]),
            Err(TunnelError::InternalInvariantViolation(_))
        ));
    }
}
