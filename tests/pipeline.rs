//! Full-pipeline test: synthetic pcap bytes in, TSV rows out.

use std::io::Write;
use std::path::Path;

use bson::doc;
use etherparse::PacketBuilder;

use mongopacket::capture::{self, Config};
use mongopacket::pcap::CaptureFile;
use mongopacket::sink::TsvStorage;

const CLIENT: [u8; 4] = [192, 168, 1, 10];
const SERVER: [u8; 4] = [192, 168, 1, 20];
const CLIENT_PORT: u16 = 50123;
const MONGO_PORT: u16 = 27017;

struct TcpFrameSpec<'a> {
    ts_us: i64,
    seq: u32,
    syn: bool,
    fin: bool,
    payload: &'a [u8],
}

fn ethernet_frame(spec: &TcpFrameSpec<'_>) -> Vec<u8> {
    let mut builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
        .ipv4(CLIENT, SERVER, 64)
        .tcp(CLIENT_PORT, MONGO_PORT, spec.seq, 65535);
    if spec.syn {
        builder = builder.syn();
    } else {
        builder = builder.ack(1);
    }
    if spec.fin {
        builder = builder.fin();
    }
    let mut out = Vec::with_capacity(builder.size(spec.payload.len()));
    builder.write(&mut out, spec.payload).unwrap();
    out
}

/// Legacy little-endian pcap file wrapping the given Ethernet frames.
fn write_pcap(path: &Path, frames: &[Vec<u8>], timestamps: &[i64]) {
    let mut data = Vec::new();
    data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]);
    data.extend_from_slice(&[0x02, 0x00, 0x04, 0x00]);
    data.extend_from_slice(&[0u8; 8]); // thiszone, sigfigs
    data.extend_from_slice(&0xffff_u32.to_le_bytes()); // snaplen
    data.extend_from_slice(&1u32.to_le_bytes()); // Ethernet

    for (frame, ts_us) in frames.iter().zip(timestamps) {
        data.extend_from_slice(&((ts_us / 1_000_000) as u32).to_le_bytes());
        data.extend_from_slice(&((ts_us % 1_000_000) as u32).to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        data.extend_from_slice(frame);
    }

    std::fs::File::create(path)
        .unwrap()
        .write_all(&data)
        .unwrap();
}

fn query_message(request_id: u32, query: &bson::Document) -> Vec<u8> {
    let name = b"db.$cmd\0";
    let mut docbytes = Vec::new();
    query.to_writer(&mut docbytes).unwrap();

    let total = 16 + 4 + name.len() + 4 + 4 + docbytes.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as i32).to_le_bytes());
    out.extend_from_slice(&request_id.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&2004i32.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&(-1i32).to_le_bytes());
    out.extend_from_slice(&docbytes);
    out
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.split('\t').map(|f| f.to_string()).collect())
        .collect()
}

#[test]
fn pcap_to_tsv_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let pcap_path = dir.path().join("capture.pcap");
    let prefix = dir.path().join("capture");

    // SYN, then the query split across two data packets, then FIN.
    let msg = query_message(7, &doc! { "ismaster": 1i32 });
    let (head, tail) = msg.split_at(20);
    let isn = 1_000u32;
    let frames = vec![
        ethernet_frame(&TcpFrameSpec {
            ts_us: 1_000_000,
            seq: isn,
            syn: true,
            fin: false,
            payload: &[],
        }),
        ethernet_frame(&TcpFrameSpec {
            ts_us: 1_050_000,
            seq: isn + 1,
            syn: false,
            fin: false,
            payload: head,
        }),
        ethernet_frame(&TcpFrameSpec {
            ts_us: 1_100_000,
            seq: isn + 1 + head.len() as u32,
            syn: false,
            fin: false,
            payload: tail,
        }),
        ethernet_frame(&TcpFrameSpec {
            ts_us: 1_200_000,
            seq: isn + 1 + msg.len() as u32,
            syn: false,
            fin: true,
            payload: &[],
        }),
    ];
    write_pcap(
        &pcap_path,
        &frames,
        &[1_000_000, 1_050_000, 1_100_000, 1_200_000],
    );

    let capture_file = CaptureFile::open(&pcap_path).unwrap();
    let storage = TsvStorage::create(&prefix).unwrap();
    let config = Config {
        group: "it".to_string(),
        ..Config::default()
    };
    let stats = capture::run(capture_file, storage, config).unwrap();

    assert_eq!(stats.frames, 4);
    assert_eq!(stats.tcp_segments, 4);
    assert_eq!(stats.messages, 1);

    // Packet rows: header plus one row per TCP frame, ids in order.
    let packets = read_rows(&dir.path().join("capture-packets.tsv"));
    assert_eq!(packets.len(), 5);
    assert_eq!(packets[0][0], "group");
    for (i, row) in packets[1..].iter().enumerate() {
        assert_eq!(row[0], "it");
        assert_eq!(row[1], (i + 1).to_string()); // packet_id, capture order
    }
    assert_eq!(packets[1][9], "1"); // first frame carries SYN
    assert_eq!(packets[4][10], "1"); // last frame carries FIN
    assert_eq!(packets[2][14], "20"); // head payload size

    // Message rows: the one reconstructed query.
    let events = read_rows(&dir.path().join("capture-events.tsv"));
    assert_eq!(events.len(), 2);
    let row = &events[1];
    assert_eq!(row[0], "it");
    assert_eq!(row[2], "1050000"); // start: first data packet
    assert_eq!(row[3], "1100000"); // end: second data packet
    assert_eq!(row[5], "1"); // stream_start, SYN was captured
    assert_eq!(row[7], "7"); // request_id
    assert_eq!(row[9], "192.168.1.10");
    assert_eq!(row[10], CLIENT_PORT.to_string());
    assert_eq!(row[11], "192.168.1.20");
    assert_eq!(row[12], MONGO_PORT.to_string());
    assert_eq!(row[13], "OP_QUERY");

    let op: serde_json::Value = serde_json::from_str(&row[14]).unwrap();
    assert_eq!(op["full_collection_name"], "db.$cmd");
    assert_eq!(op["query"]["ismaster"], 1);

    let fragments: serde_json::Value = serde_json::from_str(&row[15]).unwrap();
    assert_eq!(fragments.as_array().unwrap().len(), 2);
    assert_eq!(fragments[0]["length"], 20);
}

#[test]
fn non_mongo_traffic_only_yields_packet_events() {
    let dir = tempfile::tempdir().unwrap();
    let pcap_path = dir.path().join("capture.pcap");
    let prefix = dir.path().join("capture");

    // TCP on a non-mongo port: packet events, no reassembly.
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
        .ipv4(CLIENT, SERVER, 64)
        .tcp(40000, 8080, 500, 65535)
        .ack(1);
    let mut frame = Vec::new();
    builder.write(&mut frame, b"GET / HTTP/1.1\r\n").unwrap();
    write_pcap(&pcap_path, &[frame], &[2_000_000]);

    let capture_file = CaptureFile::open(&pcap_path).unwrap();
    let storage = TsvStorage::create(&prefix).unwrap();
    let stats = capture::run(capture_file, storage, Config::default()).unwrap();

    assert_eq!(stats.frames, 1);
    assert_eq!(stats.tcp_segments, 1);
    assert_eq!(stats.messages, 0);

    let packets = read_rows(&dir.path().join("capture-packets.tsv"));
    assert_eq!(packets.len(), 2);
    let events = read_rows(&dir.path().join("capture-events.tsv"));
    assert_eq!(events.len(), 1); // header only
}
