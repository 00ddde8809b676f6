// Per-question dispatch
//
// question -> record type -> route -> sink -> builder -> answers. Every fault
// on the way ends up as SERVFAIL; severity only decides how loudly it's logged.

use super::Shared;
use crate::builders::{self, ANY_CANDIDATES, SUPPORTED_TYPES};
use crate::dns::{Question, Rcode, Record, RecordType, Transaction};
use crate::sink::{Sink, SinkError};
use crate::{Severity, TunnelError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::PoisonError;

/// TTL on every answer; caching resolvers may honor it, the tunnel doesn't care
pub const ANSWER_TTL: u32 = 3600;

impl Shared {
    /// Record type to answer with. ANY picks at random, never AAAA.
    pub(crate) fn resolve_type(&self, qtype: RecordType) -> Result<RecordType, TunnelError> {
        match qtype {
            RecordType::Any => {
                let rtype = ANY_CANDIDATES[self.randomness.choose_index(ANY_CANDIDATES.len())];
                log::debug!(target: self.target.as_str(), "ANY request, answering with {}", rtype);
                Ok(rtype)
            }
            rtype if SUPPORTED_TYPES.contains(&rtype) => Ok(rtype),
            other => Err(TunnelError::UnsupportedRecordType(other)),
        }
    }

    pub(crate) fn handle_question(&self, question: &Question) -> Result<Option<Vec<Record>>, TunnelError> {
        let rtype = self.resolve_type(question.qtype)?;

        let matched = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(&question.name)?;
        let Some(matched) = matched else {
            log::debug!(target: self.target.as_str(), "Question wasn't for us: {}", question);
            return Ok(None);
        };

        let builder = builders::for_type(rtype, matched.budget()?, self.randomness.as_ref())?;
        let max_length = builder.max_length();

        let reply = feed(matched.entry.sink.as_ref(), &matched.payload, max_length)?.unwrap_or_default();
        if reply.len() > max_length {
            return Err(TunnelError::SinkOverflow {
                length: reply.len(),
                max: max_length,
            });
        }

        let answers = builder
            .build(&reply)?
            .into_iter()
            .map(|rdata| Record {
                name: question.name.clone(),
                rtype,
                class: question.qclass,
                ttl: ANSWER_TTL,
                rdata,
            })
            .collect();

        Ok(Some(answers))
    }

    pub(crate) async fn handle_transaction(&self, tx: Transaction) {
        let target = self.target.as_str();

        let outcome = match tx.request().questions.as_slice() {
            [question] => {
                log::debug!(target: target, "Question from {}: {}", tx.peer(), question);
                self.handle_question(question)
            }
            questions => Err(TunnelError::Protocol(format!(
                "Incoming DNS request had {} questions (expected 1)",
                questions.len()
            ))),
        };

        let sent = match outcome {
            Ok(Some(answers)) if !answers.is_empty() => tx.answer(answers).await,
            Ok(_) => match &self.passthrough {
                Some(upstream) => tx.passthrough(upstream, self.passthrough_timeout).await,
                None => tx.error(Rcode::NxDomain).await,
            },
            Err(e) => {
                match e.severity() {
                    Severity::Recoverable => {
                        log::error!(target: target, "Error processing DNS request: {}", e);
                    }
                    Severity::Bug => {
                        log::error!(target: target, "Serious error processing DNS request: {}", e);
                        log::debug!(target: target, "While handling {:?}", tx.request());
                    }
                }
                tx.error(Rcode::ServFail).await
            }
        };

        if let Err(e) = sent {
            log::warn!(target: target, "Couldn't send DNS response: {}", e);
        }
    }
}

/// Call the sink; a panic inside it is reported as a bug, not propagated
fn feed(sink: &dyn Sink, data: &[u8], max_length: usize) -> Result<Option<Vec<u8>>, TunnelError> {
    match catch_unwind(AssertUnwindSafe(|| sink.feed(data, max_length))) {
        Ok(reply) => Ok(reply?),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(SinkError::Bug(format!("sink panicked: {}", message)).into())
        }
    }
}
