// CNAME, MX and NS builders: the reply becomes a name

use super::{double_check_length, RecordBuilder};
use crate::dns::{RData, RecordType};
use crate::name_budget::NameBudget;
use crate::TunnelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Cname,
    Mx { preference: u16 },
    Ns,
}

#[derive(Debug, Clone)]
pub struct NameBuilder {
    shape: Shape,
    budget: NameBudget,
}

impl NameBuilder {
    pub fn cname(budget: NameBudget) -> Self {
        Self {
            shape: Shape::Cname,
            budget,
        }
    }

    pub fn mx(budget: NameBudget, preference: u16) -> Self {
        Self {
            shape: Shape::Mx { preference },
            budget,
        }
    }

    pub fn ns(budget: NameBudget) -> Self {
        Self {
            shape: Shape::Ns,
            budget,
        }
    }
}

impl RecordBuilder for NameBuilder {
    fn record_type(&self) -> RecordType {
        match self.shape {
            Shape::Cname => RecordType::Cname,
            Shape::Mx { .. } => RecordType::Mx,
            Shape::Ns => RecordType::Ns,
        }
    }

    fn max_length(&self) -> usize {
        self.budget.max_length()
    }

    fn build(&self, data: &[u8]) -> Result<Vec<RData>, TunnelError> {
        log::debug!("{}: encoding {} bytes", self.record_type(), data.len());

        let name = self.budget.encode_name(data)?;
        let rdata = match self.shape {
            Shape::Cname => RData::Cname(name),
            Shape::Mx { preference } => RData::Mx {
                preference,
                exchange: name,
            },
            Shape::Ns => RData::Ns(name),
        };

        let records = vec![rdata];
        double_check_length(&records)?;
        Ok(records)
    }
}
