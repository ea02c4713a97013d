use std::io::{self, Read, Write};
use std::slice::from_ref;

use super::{BDictionary, BInt, BList, BSlice, Entry};
use crate::error::{ErrorKind, Result};

pub mod delimiters {
    pub const INT_PREFIX: u8 = b'i';
    pub const LIST_PREFIX: u8 = b'l';
    pub const DICTIONARY_PREFIX: u8 = b'd';

    pub const STRING_INFIX: u8 = b':';

    pub const END_SUFFIX: u8 = b'e';
}

/// Deepest list/dictionary nesting accepted while decoding.
pub const MAX_DEPTH: usize = 512;

/// Reads one bencoded value from a byte stream.
///
/// Decoding is strictly sequential: exactly the bytes of one value are consumed,
/// so the same reader can be handed back for the next message.
pub trait BDecode: Sized {
    /// Decodes the rest of a value whose leading tag byte was already consumed.
    fn decode_tagged(tag: u8, reader: &mut impl Read) -> Result<Self>;

    fn decode_from(reader: &mut impl Read) -> Result<Self> {
        let tag = utils::next_byte(reader)?.ok_or(ErrorKind::Eof)?;
        Self::decode_tagged(tag, reader)
    }

    fn decode(mut bytes: &[u8]) -> Result<Self> {
        Self::decode_from(&mut bytes)
    }
}

pub trait BEncode {
    fn encode_into_stream(&self, stream: &mut impl Write) -> io::Result<()>;

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        //Writing into a Vec never returns an error
        self.encode_into_stream(&mut bytes).unwrap();

        bytes
    }
}

impl BDecode for Entry {
    fn decode_tagged(tag: u8, reader: &mut impl Read) -> Result<Self> {
        decode_entry(tag, reader, 0)
    }
}

/// `depth` counts the containers enclosing the value being decoded.
fn decode_entry(tag: u8, reader: &mut impl Read, depth: usize) -> Result<Entry> {
    match tag {
        delimiters::INT_PREFIX => Ok(Entry::Integer(decode_int(reader)?)),
        delimiters::LIST_PREFIX => Ok(Entry::List(decode_list(reader, descend(depth)?)?)),
        delimiters::DICTIONARY_PREFIX => {
            Ok(Entry::Dictionary(decode_dictionary(reader, descend(depth)?)?))
        }
        b'0'..=b'9' => Ok(Entry::String(decode_string(tag, reader)?)),
        _ => Err(ErrorKind::Format(tag).into()),
    }
}

fn descend(depth: usize) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(ErrorKind::Malformed(format!("nesting deeper than {MAX_DEPTH}")).into());
    }

    Ok(depth + 1)
}

impl BEncode for Entry {
    fn encode_into_stream(&self, stream: &mut impl Write) -> io::Result<()> {
        match self {
            Entry::Integer(i) => i.encode_into_stream(stream),
            Entry::String(s) => s.as_str().encode_into_stream(stream),
            Entry::List(l) => l.as_slice().encode_into_stream(stream),
            Entry::Dictionary(d) => d.encode_into_stream(stream),
        }
    }
}

fn decode_int(reader: &mut impl Read) -> Result<BInt> {
    let repr = utils::collect_up_to(reader, delimiters::END_SUFFIX)?;

    utils::parse_ascii(&repr)
}

impl BEncode for BInt {
    fn encode_into_stream(&self, stream: &mut impl Write) -> io::Result<()> {
        stream.write_all(from_ref(&delimiters::INT_PREFIX))?;
        stream.write_all(self.to_string().as_bytes())?;
        stream.write_all(from_ref(&delimiters::END_SUFFIX))?;

        Ok(())
    }
}

/// `first` is the leading length digit, already consumed as the tag.
fn decode_string(first: u8, reader: &mut impl Read) -> Result<String> {
    let mut len_buf = vec![first];
    len_buf.extend(utils::collect_up_to(reader, delimiters::STRING_INFIX)?);

    if !len_buf.iter().all(u8::is_ascii_digit) {
        return Err(ErrorKind::Malformed(format!(
            "bad string length {:?}",
            String::from_utf8_lossy(&len_buf)
        ))
        .into());
    }
    let len = utils::parse_ascii::<usize>(&len_buf)?;

    let mut repr = Vec::new();
    reader.take(len as u64).read_to_end(&mut repr)?;

    if repr.len() != len {
        return Err(ErrorKind::Eof.into());
    }

    String::from_utf8(repr).map_err(|err| ErrorKind::Malformed(err.to_string()).into())
}

impl BEncode for str {
    fn encode_into_stream(&self, stream: &mut impl Write) -> io::Result<()> {
        stream.write_all(self.len().to_string().as_bytes())?;
        stream.write_all(from_ref(&delimiters::STRING_INFIX))?;
        stream.write_all(self.as_bytes())?;

        Ok(())
    }
}

fn decode_list(reader: &mut impl Read, depth: usize) -> Result<BList> {
    let mut list = vec![];

    loop {
        match utils::next_byte(reader)? {
            Some(delimiters::END_SUFFIX) => break,
            Some(tag) => list.push(decode_entry(tag, reader, depth)?),
            None => return Err(ErrorKind::Eof.into()),
        };
    }

    Ok(list)
}

impl BEncode for BSlice {
    fn encode_into_stream(&self, stream: &mut impl Write) -> io::Result<()> {
        stream.write_all(from_ref(&delimiters::LIST_PREFIX))?;

        for item in self {
            item.encode_into_stream(stream)?;
        }

        stream.write_all(from_ref(&delimiters::END_SUFFIX))?;

        Ok(())
    }
}

fn decode_dictionary(reader: &mut impl Read, depth: usize) -> Result<BDictionary> {
    let mut dictionary = BDictionary::new();

    loop {
        match utils::next_byte(reader)? {
            Some(delimiters::END_SUFFIX) => break,
            Some(tag) => {
                let key = match decode_entry(tag, reader, depth)? {
                    Entry::String(key) => key,
                    other => {
                        return Err(ErrorKind::Malformed(format!(
                            "dictionary key must be a str, not {}",
                            other.type_name()
                        ))
                        .into())
                    }
                };
                let tag = utils::next_byte(reader)?.ok_or(ErrorKind::Eof)?;
                let value = decode_entry(tag, reader, depth)?;

                //Repeated keys: last one wins
                dictionary.insert(key, value);
            }
            None => return Err(ErrorKind::Eof.into()),
        };
    }

    Ok(dictionary)
}

impl BEncode for BDictionary {
    fn encode_into_stream(&self, stream: &mut impl Write) -> io::Result<()> {
        stream.write_all(from_ref(&delimiters::DICTIONARY_PREFIX))?;

        //BTreeMap iterates in byte-wise key order
        for (key, val) in self {
            key.as_str().encode_into_stream(stream)?;
            val.encode_into_stream(stream)?;
        }

        stream.write_all(from_ref(&delimiters::END_SUFFIX))?;

        Ok(())
    }
}

pub mod utils {
    use std::io::{self, Read};

    use crate::error::{ErrorKind, Result};

    /// Reads a single byte, retrying interrupted reads. `None` means the stream is exhausted.
    pub fn next_byte(reader: &mut impl Read) -> io::Result<Option<u8>> {
        let mut byte = 0;

        loop {
            match reader.read(std::slice::from_mut(&mut byte)) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte)),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Collects bytes up to (not including) `delimiter`, which is consumed.
    pub fn collect_up_to(reader: &mut impl Read, delimiter: u8) -> Result<Vec<u8>> {
        let mut collected = vec![];

        loop {
            match next_byte(reader)? {
                Some(byte) if byte == delimiter => return Ok(collected),
                Some(byte) => collected.push(byte),
                None => return Err(ErrorKind::Eof.into()),
            }
        }
    }

    pub fn parse_ascii<T: std::str::FromStr>(bytes: &[u8]) -> Result<T> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|repr| repr.parse::<T>().ok())
            .ok_or_else(|| {
                ErrorKind::Malformed(format!("bad number {:?}", String::from_utf8_lossy(bytes)))
                    .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rstest::*;

    /// Hands out at most one byte per `read` call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match (self.0.split_first(), buf.first_mut()) {
                (Some((&byte, rest)), Some(slot)) => {
                    *slot = byte;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    fn dict<const N: usize>(pairs: [(&str, Entry); N]) -> Entry {
        Entry::Dictionary(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    #[rstest]
    #[case::negative(Entry::from(-5), "i-5e")]
    #[case::zero(Entry::from(0), "i0e")]
    #[case::boolean(Entry::from(true), "i1e")]
    #[case::empty_string(Entry::from(""), "0:")]
    #[case::utf8_length_in_bytes(Entry::from("é"), "2:é")]
    #[case::empty_list(Entry::List(vec![]), "le")]
    #[case::empty_dict(dict([]), "de")]
    #[case::sorted_keys(dict([("b", Entry::from(1)), ("a", Entry::from(2))]), "d1:ai2e1:bi1ee")]
    #[case::nested(
        dict([("status", Entry::List(vec!["done".into()])), ("id", "1".into())]),
        "d2:id1:16:statusl4:doneee"
    )]
    fn encoding(#[case] entry: Entry, #[case] bytes: &str) {
        assert_eq!(entry.encode(), bytes.as_bytes());
    }

    #[rstest]
    #[case::negative("i-5e", Entry::from(-5))]
    #[case::empty_string("0:", Entry::from(""))]
    #[case::empty_list("le", Entry::List(vec![]))]
    #[case::empty_dict("de", dict([]))]
    #[case::message(
        "d2:op4:eval4:code7:(+ 1 2)e",
        dict([("op", "eval".into()), ("code", "(+ 1 2)".into())])
    )]
    fn decoding(#[case] bytes: &str, #[case] entry: Entry) {
        assert_eq!(Entry::decode(bytes.as_bytes()).unwrap(), entry);
    }

    #[test]
    fn decoding_survives_short_reads() {
        let decoded = Entry::decode_from(&mut Trickle(b"5:hello")).unwrap();
        assert_eq!(decoded, Entry::from("hello"));

        let decoded = Entry::decode_from(&mut Trickle(b"d6:statusl4:doneee")).unwrap();
        assert_eq!(decoded, dict([("status", Entry::List(vec!["done".into()]))]));
    }

    #[test]
    fn decoding_consumes_exactly_one_value() {
        let mut stream: &[u8] = b"i1e3:twole";

        assert_eq!(Entry::decode_from(&mut stream).unwrap(), Entry::from(1));
        assert_eq!(Entry::decode_from(&mut stream).unwrap(), Entry::from("two"));
        assert_eq!(Entry::decode_from(&mut stream).unwrap(), Entry::List(vec![]));
        assert!(Entry::decode_from(&mut stream).unwrap_err().is_eof());
    }

    #[rstest]
    #[case::boolean(Entry::from(true), Entry::Integer(1))]
    #[case::negative(Entry::from(-12), Entry::from(-12))]
    #[case::extremes(Entry::from(i64::MIN), Entry::from(i64::MIN))]
    #[case::empty_string(Entry::from(""), Entry::from(""))]
    #[case::multibyte(Entry::from("ü→λ"), Entry::from("ü→λ"))]
    #[case::empty_list(Entry::List(vec![]), Entry::List(vec![]))]
    #[case::empty_dict(dict([]), dict([]))]
    #[case::booleans_inside(
        dict([("quiet", Entry::from(false)), ("xs", Entry::List(vec![Entry::from(true)]))]),
        dict([("quiet", Entry::Integer(0)), ("xs", Entry::List(vec![Entry::Integer(1)]))])
    )]
    #[case::message(
        dict([
            ("id", "42".into()),
            ("ns", "user".into()),
            ("value", Entry::List(vec![Entry::from(-12), Entry::from("ü"), dict([])])),
        ]),
        dict([
            ("id", "42".into()),
            ("ns", "user".into()),
            ("value", Entry::List(vec![Entry::from(-12), Entry::from("ü"), dict([])])),
        ])
    )]
    fn round_trip(#[case] value: Entry, #[case] expected: Entry) {
        assert_eq!(Entry::decode(&value.encode()).unwrap(), expected);
    }

    #[rstest]
    #[case::lists(b'l', 100_000)]
    #[case::dictionaries_as_values(b'd', 100_000)]
    #[case::just_past_the_limit(b'l', MAX_DEPTH + 1)]
    fn deep_nesting_is_rejected(#[case] open: u8, #[case] depth: usize) {
        let mut bytes = Vec::new();
        for _ in 0..depth {
            bytes.push(open);
            if open == b'd' {
                bytes.extend_from_slice(b"1:k");
            }
        }
        bytes.extend(std::iter::repeat(b'e').take(depth));

        let err = Entry::decode(&bytes).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Malformed(_)), "{err}");
    }

    #[test]
    fn nesting_up_to_the_limit_decodes() {
        let mut bytes = vec![b'l'; MAX_DEPTH];
        bytes.extend(vec![b'e'; MAX_DEPTH]);

        assert!(Entry::decode(&bytes).is_ok());
    }

    #[rstest]
    #[case::empty_stream("")]
    #[case::unterminated_list("li1e")]
    #[case::unterminated_dict("d1:a")]
    #[case::unterminated_int("i12")]
    #[case::short_string("5:hel")]
    #[case::missing_colon("12")]
    fn eof(#[case] bytes: &str) {
        let err: Error = Entry::decode(bytes.as_bytes()).unwrap_err();
        assert!(err.is_eof(), "{bytes:?} gave {err}");
    }

    #[test]
    fn unknown_tag_is_named() {
        let err = Entry::decode(b"x").unwrap_err();

        assert!(matches!(err.kind(), ErrorKind::Format(b'x')));
        assert_eq!(err.to_string(), "unexpected type x in bencode data");
    }

    #[rstest]
    #[case::bad_int(b"iabce")]
    #[case::bad_length(b"1x:a")]
    #[case::bad_utf8(b"2:\xff\xfe")]
    #[case::int_key(b"di1ei2ee")]
    fn malformed(#[case] bytes: &[u8]) {
        let err = Entry::decode(bytes).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Malformed(_)), "{err}");
    }
}
