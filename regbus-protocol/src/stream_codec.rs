//! [tokio_util::codec] integration for the SLIP framing layer.
//!
//! Wrapping an async byte stream in a `Framed<_, SlipCodec>` yields one
//! verified payload per inbound frame and SLIP-encodes outbound payloads,
//! so async servers and bridges can reuse the framing layer without the
//! blocking link adapters.

use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::fcs::{FcsPolicy, append_fcs, verify_fcs};
use crate::framing;

/// SLIP framing with an attached CRC-32 frame check.
#[derive(Default)]
pub struct SlipCodec {
    policy: FcsPolicy,
    zeropad: bool,
}

impl SlipCodec {
    pub fn new(policy: FcsPolicy, zeropad: bool) -> SlipCodec {
        SlipCodec { policy, zeropad }
    }
}

impl Decoder for SlipCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        while let Some(pos) = src.iter().position(|&b| b == framing::END) {
            let frame = src.split_to(pos + 1);
            let payload = framing::decode(&frame);
            if payload.is_empty() {
                continue;
            }
            match self.policy {
                FcsPolicy::Off => return Ok(Some(Bytes::from(payload))),
                FcsPolicy::Drop => match verify_fcs(&payload) {
                    Ok(data) => return Ok(Some(Bytes::copy_from_slice(data))),
                    Err(_) => continue,
                },
                FcsPolicy::Warn => match verify_fcs(&payload) {
                    Ok(data) => return Ok(Some(Bytes::copy_from_slice(data))),
                    Err(_) => {
                        let keep = payload.len().saturating_sub(crate::fcs::FCS_LEN);
                        return Ok(Some(Bytes::copy_from_slice(&payload[..keep])));
                    }
                },
            }
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for SlipCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), io::Error> {
        let checked = append_fcs(item.to_vec(), self.zeropad);
        dst.extend_from_slice(&framing::encode(&checked));
        Ok(())
    }
}
