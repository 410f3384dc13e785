use jute::{Deserializer, JuteDeserialize, JuteError, JuteSerialize, Serializer};

#[test]
fn serialize_primitives() {
    let mut s = Serializer::new();
    s.write_bool(true);
    s.write_bool(false);
    s.write_i32(19406);
    s.write_i32(2147483647);
    s.write_i32(-420);
    s.write_i64(19406);
    s.write_i64(9223372036854775807);
    s.write_str("hello");
    s.write_buffer(&[0x01, 0x02, 0x03, 0x04]);

    let expected: &[u8] = &[
        0x01, // boolean: true
        0x00, // boolean: false
        0x00, 0x00, 0x4b, 0xce, // int: 19406
        0x7f, 0xff, 0xff, 0xff, // int: 2147483647
        0xff, 0xff, 0xfe, 0x5c, // int: -420
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x4b, 0xce, // long: 19406
        0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // long: max
        // string: hello
        0x00, 0x00, 0x00, 0x05, // string len
        0x68, 0x65, 0x6c, 0x6c, 0x6f, // 'h', 'e', 'l', 'l', 'o'
        // buffer: 0x01, 0x02, 0x03, 0x04
        0x00, 0x00, 0x00, 0x04, // buffer len
        0x01, 0x02, 0x03, 0x04, // buffer contents
    ];
    let out = s.into_buffer();
    assert_eq!(out.len(), expected.len());
    assert_eq!(out.as_ref(), expected);
}

#[test]
fn serialize_unsigned() {
    let mut s = Serializer::new();
    s.write_u32(0xdeadbeef);
    s.write_u64(0x0102030405060708);

    let expected: &[u8] = &[
        0xde, 0xad, 0xbe, 0xef, // u32
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, // u64
    ];
    assert_eq!(s.into_buffer().as_ref(), expected);
}

#[test]
fn primitives_round_trip() -> Result<(), JuteError> {
    let mut s = Serializer::new();
    s.write_i64(-42);
    s.write_u64(42);
    s.write_str("/zoo/节点");
    s.write_bool(true);
    s.write_buffer(b"opaque");

    let mut d = Deserializer::from_buf(s.into_buffer());
    assert_eq!(d.read_i64()?, -42);
    assert_eq!(d.read_u64()?, 42);
    assert_eq!(d.read_string()?, "/zoo/节点");
    assert!(d.read_bool()?);
    assert_eq!(d.read_buffer()?, b"opaque");
    assert_eq!(d.remaining(), 0);
    Ok(())
}

#[test]
fn read_past_end_fails() {
    let mut s = Serializer::new();
    s.write_i32(7);
    let mut d = Deserializer::from_buf(s.into_buffer());
    assert!(d.read_i32().is_ok());
    assert!(matches!(
        d.read_i64(),
        Err(JuteError::UnexpectedEof { need: 8, .. })
    ));
}

#[test]
fn string_length_beyond_input_fails() {
    let mut s = Serializer::new();
    s.write_i32(100); // claims 100 bytes, none follow
    let mut d = Deserializer::from_buf(s.into_buffer());
    assert!(matches!(
        d.read_string(),
        Err(JuteError::UnexpectedEof { need: 100, .. })
    ));
}

#[test]
fn negative_length_fails() {
    let mut s = Serializer::new();
    s.write_i32(-1);
    let mut d = Deserializer::from_buf(s.into_buffer());
    assert!(matches!(
        d.read_buffer(),
        Err(JuteError::InvalidLength(-1))
    ));
}

struct AuthRecord {
    scheme: String,
    id: String,
}

impl JuteSerialize for AuthRecord {
    fn serialize(&self, out: &mut Serializer) {
        out.write_str(&self.scheme);
        out.write_str(&self.id);
    }
}

impl JuteDeserialize for AuthRecord {
    fn deserialize(input: &mut Deserializer) -> Result<Self, JuteError> {
        Ok(AuthRecord {
            scheme: input.read_string()?,
            id: input.read_string()?,
        })
    }
}

#[test]
fn vector_round_trip() -> Result<(), JuteError> {
    let records = vec![
        AuthRecord {
            scheme: "digest".to_string(),
            id: "user:hash".to_string(),
        },
        AuthRecord {
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        },
    ];

    let mut s = Serializer::new();
    s.write_vec(&records);
    let mut d = Deserializer::from_buf(s.into_buffer());
    let out: Vec<AuthRecord> = d.read_vec()?;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].scheme, "digest");
    assert_eq!(out[0].id, "user:hash");
    assert_eq!(out[1].scheme, "world");
    assert_eq!(out[1].id, "anyone");
    Ok(())
}

#[test]
fn record_helpers_round_trip_and_check_trailing() {
    let record = AuthRecord {
        scheme: "ip".to_string(),
        id: "10.0.0.1".to_string(),
    };

    let buf = jute::to_buffer(&record);
    let out: AuthRecord = jute::from_buffer(buf.clone()).expect("round trip");
    assert_eq!(out.scheme, "ip");
    assert_eq!(out.id, "10.0.0.1");

    let mut with_garbage = buf.to_vec();
    with_garbage.push(0x00);
    assert!(matches!(
        jute::from_buffer::<AuthRecord>(bytes::Bytes::from(with_garbage)),
        Err(JuteError::TrailingBytes(1))
    ));
}

#[test]
fn empty_vector_is_four_zero_bytes() {
    let mut s = Serializer::new();
    s.write_vec::<AuthRecord>(&[]);
    assert_eq!(s.into_buffer().as_ref(), &[0x00, 0x00, 0x00, 0x00]);
}
