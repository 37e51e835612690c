/// Read and write implementations for the register-bus messages.
///
/// Both directions share the same eight-byte header, big-endian throughout:
/// opcode (1), word count minus one (1), sequence (1), reserved (1), flat
/// address (4). Write commands and read replies append one 32-bit word per
/// counted word; replies terminate with a one-byte status.
use std::io::{self, Read, Write};

use crate::{
    error::DecodeError,
    protocol::{Command, MAX_WORDS, Opcode, Reply},
};

const HEADER_LEN: usize = 8;

fn read_header(reader: &mut impl Read) -> Result<(Opcode, usize, u8, u32), DecodeError> {
    let mut buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut buf)?;
    let opcode = Opcode::from_u8(buf[0]).ok_or(DecodeError::UnknownOpcode(buf[0]))?;
    let count = buf[1] as usize + 1;
    if count > MAX_WORDS {
        return Err(DecodeError::BadWordCount {
            max: MAX_WORDS,
            got: count,
        });
    }
    let sequence = buf[2];
    // buf[3] is reserved and ignored on receive.
    let addr = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    Ok((opcode, count, sequence, addr))
}

fn write_header(
    writer: &mut impl Write,
    opcode: Opcode,
    count: usize,
    sequence: u8,
    addr: u32,
) -> io::Result<()> {
    writer.write_all(&[opcode as u8, (count - 1) as u8, sequence, 0])?;
    writer.write_all(&addr.to_be_bytes())
}

impl Command {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        write_header(
            writer,
            self.opcode(),
            self.word_count(),
            self.sequence(),
            self.addr(),
        )?;
        if let Command::Write { data, .. } = self {
            for word in data {
                writer.write_all(&word.to_be_bytes())?;
            }
        }
        Ok(())
    }

    pub fn from_reader(reader: &mut impl Read) -> Result<Command, DecodeError> {
        let (opcode, count, sequence, addr) = read_header(reader)?;
        if opcode.is_write() {
            let mut data = Vec::with_capacity(count);
            let mut word = [0u8; 4];
            for _ in 0..count {
                reader.read_exact(&mut word)?;
                data.push(u32::from_be_bytes(word));
            }
            Ok(Command::Write {
                increment: opcode.is_increment(),
                sequence,
                addr,
                data,
            })
        } else {
            Ok(Command::Read {
                increment: opcode.is_increment(),
                sequence,
                addr,
                count: count as u8,
            })
        }
    }
}

impl Reply {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        write_header(
            writer,
            self.opcode,
            self.word_count as usize,
            self.sequence,
            self.addr,
        )?;
        for word in &self.data {
            writer.write_all(&word.to_be_bytes())?;
        }
        writer.write_all(&[self.status])
    }

    pub fn from_reader(reader: &mut impl Read) -> Result<Reply, DecodeError> {
        let (opcode, count, sequence, addr) = read_header(reader)?;
        let mut data = Vec::new();
        if opcode.is_read() {
            let mut word = [0u8; 4];
            for _ in 0..count {
                reader.read_exact(&mut word)?;
                data.push(u32::from_be_bytes(word));
            }
        }
        let mut status = [0u8; 1];
        reader.read_exact(&mut status)?;
        Ok(Reply {
            opcode,
            word_count: count as u8,
            sequence,
            addr,
            data,
            status: status[0],
        })
    }
}
