use anyhow::Result;
use bytes::BytesMut;
use ttp_codec::{
    block::{BlockHeader, BlockType, decode_datagram, encode_datagram},
    crypto::auth_digest,
    handshake::{ClientParameters, ServerParameters},
    retransmission::RetransmissionRecord,
};

#[test]
fn datagram_wire_round_trip() -> Result<()> {
    let payload = b"the quick brown fox jumps over the lazy dog";
    let mut bytes = BytesMut::new();
    encode_datagram(
        BlockHeader { block: 12, block_type: BlockType::Retransmission },
        payload,
        &mut bytes,
    );

    let (header, decoded_payload) = decode_datagram(&bytes, payload.len())?;
    assert_eq!(header.block, 12);
    assert_eq!(header.block_type, BlockType::Retransmission);
    assert_eq!(decoded_payload, payload);

    Ok(())
}

#[test]
fn negotiation_records_round_trip() -> Result<()> {
    let client = ClientParameters {
        block_size: 32768,
        target_rate: 100_000_000,
        error_rate: 5_000,
        slower_num: 11,
        slower_den: 10,
        faster_num: 9,
        faster_den: 10,
    };

    let mut bytes = BytesMut::new();
    client.encode(&mut bytes);
    assert_eq!(ClientParameters::decode(&bytes)?, client);

    let server = ServerParameters { file_size: 1 << 20, block_size: 32768, block_count: 32, epoch: 1_700_000_000 };
    let mut bytes = BytesMut::new();
    server.encode(&mut bytes);
    assert_eq!(ServerParameters::decode(&bytes)?, server);

    Ok(())
}

#[test]
fn retransmission_batch_round_trips_back_to_back() -> Result<()> {
    let records = [
        RetransmissionRecord::retransmit(7),
        RetransmissionRecord::retransmit(12),
        RetransmissionRecord::restart(1000),
        RetransmissionRecord::error_rate(42_000),
    ];

    let mut bytes = BytesMut::new();
    for record in records {
        record.encode(&mut bytes);
    }

    for (i, expected) in records.iter().enumerate() {
        let offset = i * ttp_codec::retransmission::RECORD_SIZE;
        let decoded =
            RetransmissionRecord::decode(&bytes[offset..offset + ttp_codec::retransmission::RECORD_SIZE])?;
        assert_eq!(decoded, *expected);
    }

    Ok(())
}

#[test]
fn auth_digest_matches_independent_computation() {
    let challenge = [3u8; 64];
    let secret = b"kitten";

    let digest = auth_digest(secret, &challenge);

    let mut expected_xor = [0u8; 64];
    for (i, byte) in expected_xor.iter_mut().enumerate() {
        *byte = challenge[i] ^ secret[i % secret.len()];
    }

    use md5::{Digest as _, Md5};
    let mut hasher = Md5::new();
    hasher.update(expected_xor);
    let expected: [u8; 16] = hasher.finalize().into();

    assert_eq!(digest, expected);
}
