//! Decoding of ABI-encoded event topics and call outputs.
//!
//! Topics are 32-byte words. Addresses occupy the low 20 bytes of a word with the
//! upper 12 bytes zeroed, integers are big-endian. Dynamic strings are a length word
//! followed by the bytes themselves.

use alloy_primitives::{Address, B256, U256};
use bigdecimal::BigDecimal;

use crate::models::block_data::Log;
use crate::models::errors::DecodeError;

const WORD: usize = 32;
const ADDRESS_PADDING: usize = 12;

/// Looks `topics[0]` up in a signature table.
///
/// Logs without topics or with a signature missing from the table yield `None`; they are
/// not errors.
pub fn classify<K: Copy>(table: &[(B256, K)], log: &Log) -> Option<K> {
    let signature = log.topics.first()?;
    table
        .iter()
        .find(|(hash, _)| hash == signature)
        .map(|(_, kind)| *kind)
}

/// Fails unless the log carries at least `expected` topics (signature included).
pub fn ensure_topic_count(log: &Log, event: &str, expected: usize) -> Result<(), DecodeError> {
    if log.topics.len() < expected {
        return Err(DecodeError::topic(format!(
            "{} expects {} topics, log {}#{} has {}",
            event,
            expected,
            log.action_hash,
            log.index,
            log.topics.len()
        )));
    }
    Ok(())
}

pub fn topic_to_address(topic: &B256) -> Result<Address, DecodeError> {
    if topic[..ADDRESS_PADDING].iter().any(|byte| *byte != 0) {
        return Err(DecodeError::topic(format!(
            "address word {} has non-zero padding",
            topic
        )));
    }
    Ok(Address::from_slice(&topic[ADDRESS_PADDING..]))
}

pub fn topic_to_uint(topic: &B256) -> U256 {
    U256::from_be_bytes(topic.0)
}

/// Lifts an unsigned word into the signed arbitrary-precision amount type.
pub fn uint_to_decimal(value: U256) -> Result<BigDecimal, DecodeError> {
    value
        .to_string()
        .parse::<BigDecimal>()
        .map_err(|e| DecodeError::topic(format!("cannot represent {} as an amount: {}", value, e)))
}

/// Decodes a dynamic string whose length word starts at `offset`.
pub fn decode_abi_string(data: &[u8], offset: usize) -> Result<String, DecodeError> {
    let length_end = offset
        .checked_add(WORD)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            DecodeError::payload(format!(
                "string length word at offset {} exceeds payload of {} bytes",
                offset,
                data.len()
            ))
        })?;

    let length = word_to_usize(&data[offset..length_end]).ok_or_else(|| {
        DecodeError::payload(format!("string length at offset {} does not fit in memory", offset))
    })?;

    let end = length_end
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            DecodeError::payload(format!(
                "declared string length {} exceeds the {} bytes remaining",
                length,
                data.len() - length_end
            ))
        })?;

    Ok(String::from_utf8_lossy(&data[length_end..end]).into_owned())
}

/// Decodes the output of a `string`-returning call.
///
/// Some legacy tokens return `bytes32` instead; exactly one word of output is read as
/// NUL-padded text.
pub fn decode_return_string(output: &[u8]) -> Result<String, DecodeError> {
    if output.len() == WORD {
        let text: Vec<u8> = output.iter().copied().take_while(|byte| *byte != 0).collect();
        return Ok(String::from_utf8_lossy(&text).into_owned());
    }

    let head = output.get(..WORD).ok_or_else(|| {
        DecodeError::payload(format!("call output of {} bytes has no head word", output.len()))
    })?;
    let offset = word_to_usize(head)
        .ok_or_else(|| DecodeError::payload("string offset does not fit in memory"))?;

    decode_abi_string(output, offset)
}

/// Decodes the output of a call returning a small unsigned integer (e.g. `decimals()`).
pub fn decode_return_u32(output: &[u8]) -> Result<u32, DecodeError> {
    let word = output.get(..WORD).ok_or_else(|| {
        DecodeError::payload(format!("call output of {} bytes has no value word", output.len()))
    })?;
    word_to_usize(word)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| DecodeError::payload(format!("value {} does not fit in u32", U256::from_be_slice(word))))
}

fn word_to_usize(word: &[u8]) -> Option<usize> {
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|byte| *byte != 0) {
        return None;
    }
    let low: [u8; 8] = low.try_into().ok()?;
    usize::try_from(u64::from_be_bytes(low)).ok()
}
