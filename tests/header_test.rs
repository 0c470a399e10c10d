//! Header assembly and validation through hand-built board buffers

use svt_decode::common::{DaqAddress, MultisampleKind, UnresolvedReason};
use svt_decode::config::{Era, EraLayout};
use svt_decode::container::Bank;
use svt_decode::emulator::encode;
use svt_decode::header::{
    validate, AssemblyError, HeaderError, HeaderErrorKind, HeaderPolicy, RocHeaderRecord,
};
use svt_decode::mapping::{ChannelMap, SensorDescriptor, SensorTable};
use svt_decode::reader::{ApvHeader, ReaderError, ReaderSettings, SvtReader};

const FEB: u32 = 2;

fn sub_header(buffer_address: u8, frame_count: u8) -> [u32; 4] {
    encode::engineering_multisample(
        MultisampleKind::Header,
        encode::feb_tail_word(FEB, 0, 0, 0, false),
        encode::apv_header_payload(&[true; 6], &[buffer_address; 6], &[frame_count; 6]),
    )
}

fn record(headers: Vec<[u32; 4]>) -> RocHeaderRecord {
    RocHeaderRecord {
        roc: 51,
        header: encode::frame_header(0, 1),
        tail: encode::frame_tail(headers.len() as u32, 0, false, false),
        multisample_headers: headers,
    }
}

fn count_kind(errors: &[HeaderError], kind: HeaderErrorKind) -> usize {
    errors.iter().filter(|e| e.kind() == kind).count()
}

fn map(era: Era) -> ChannelMap {
    let sensors = vec![SensorDescriptor {
        id: 1,
        name: "module_L1t_axial".to_string(),
        fpga: None,
        hybrid: None,
        feb: Some(FEB),
        feb_hybrid: Some(0),
    }];
    ChannelMap::build(era, &SensorTable::new("test", sensors)).unwrap()
}

fn data(hybrid: u32, channel: u32, fill: i16) -> [u32; 4] {
    encode::engineering_multisample(
        MultisampleKind::Data,
        encode::feb_tail_word(FEB, hybrid, 1, channel, false),
        encode::pack_samples(&[fill; 6]),
    )
}

fn engineering_event(words: Vec<u32>) -> Bank {
    Bank::container(0, 9, vec![Bank::container(51, 0, vec![Bank::data(3, 0, words)])])
}

#[test]
fn frame_counts_rolling_over_are_valid() {
    let counts = (3..=15).chain([0, 1]);
    let headers = counts.map(|c| sub_header(0x40, c)).collect();
    let errors = validate(&[record(headers)]);
    assert_eq!(count_kind(&errors, HeaderErrorKind::ApvFrameCountInvalid), 0);
    assert!(errors.is_empty());
}

#[test]
fn single_out_of_order_frame_count_reported_once() {
    let headers = [3, 5, 4].into_iter().map(|c| sub_header(0x40, c)).collect();
    let errors = validate(&[record(headers)]);
    assert_eq!(count_kind(&errors, HeaderErrorKind::ApvFrameCountInvalid), 1);
}

#[test]
fn buffer_address_mismatch_names_both_sub_headers() {
    let headers = vec![sub_header(0x40, 2), sub_header(0x41, 2)];
    let errors = validate(&[record(headers)]);
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        HeaderError::ApvBufferAddressMismatch {
            reference_index,
            index,
            ..
        } => assert_eq!((*reference_index, *index), (0, 1)),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn every_roc_is_validated() {
    let mut bad = record(vec![]);
    bad.roc = 52;
    bad.tail = encode::frame_tail(0, 4, false, false);
    let errors = validate(&[record(vec![sub_header(1, 1)]), bad]);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].roc(), 52);
    assert_eq!(errors[0].kind(), HeaderErrorKind::SkipCountNonzero);
}

#[test]
fn tail_count_mismatch_is_an_assembly_error() {
    let layout = EraLayout::ENGINEERING_RUN;
    let multisamples = [sub_header(1, 1), data(0, 5, 100)];
    // Declares three multisamples, two present
    let words = encode::forward_buffer(
        &layout,
        encode::frame_header(0, 9),
        &multisamples,
        encode::frame_tail(3, 0, false, false),
    );

    let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
    let decoded = reader
        .process_event(&engineering_event(words.clone()), &map(Era::EngineeringRun))
        .unwrap();
    assert!(!decoded.headers_good());
    assert_eq!(
        decoded.header_status.assembly_errors,
        vec![AssemblyError::MultisampleCountMismatch {
            roc: 51,
            declared: 3,
            actual: 2,
            dangling_words: 0,
        }]
    );
    // Samples are still extracted
    assert_eq!(decoded.samples.len(), 1);

    let strict = SvtReader::new(
        ReaderSettings::new(Era::EngineeringRun).with_policy(HeaderPolicy::FailClosed),
    );
    let result = strict.process_event(&engineering_event(words), &map(Era::EngineeringRun));
    assert!(matches!(result, Err(ReaderError::Assembly(_))));
}

#[test]
fn phys2019_trailer_found_among_unrelated_words() {
    let tail_word = |channel| encode::feb_tail_word(FEB, 0, 2, channel, false);
    let header_ms = encode::phys2019_multisample(
        true,
        encode::feb_tail_word(FEB, 0, 0, 0, false),
        encode::apv_header_payload(&[true; 6], &[7; 6], &[3; 6]),
    );
    let data_ms: Vec<[u32; 4]> = (0..4)
        .map(|ch| encode::phys2019_multisample(false, tail_word(ch), encode::pack_samples(&[ch as i16; 6])))
        .collect();

    let mut multisamples = vec![header_ms];
    multisamples.extend(data_ms);
    let declared = multisamples.len() as u32;

    let mut words = vec![0x1234_5678, 0xDEAD_BEEF, 0x0000_0042];
    encode::append_phys2019_frame(
        &mut words,
        encode::frame_header(0, 9),
        encode::frame_tail(declared, 0, false, false),
        &multisamples,
    );
    words.extend([0xDEAD_BEEF, 0x0BAD_F00D]);

    let event = Bank::container(0, 9, vec![Bank::container(60, 0, vec![Bank::data(3, 0, words)])]);
    let reader = SvtReader::new(ReaderSettings::new(Era::Phys2019));
    let decoded = reader.process_event(&event, &map(Era::Phys2019)).unwrap();

    // Five multisamples declared, one of them an APV header
    assert_eq!(decoded.samples.len(), 4);
    assert!(decoded.headers_good());
    let channels: Vec<u16> = decoded.samples.iter().map(|s| s.channel).collect();
    assert_eq!(channels, vec![256, 257, 258, 259]);
}

#[test]
fn unresolved_address_yields_one_diagnostic_record() {
    let layout = EraLayout::ENGINEERING_RUN;
    let words = encode::forward_buffer(
        &layout,
        encode::frame_header(0, 9),
        &[data(3, 10, 50)],
        encode::frame_tail(1, 0, false, false),
    );
    let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
    let decoded = reader
        .process_event(&engineering_event(words), &map(Era::EngineeringRun))
        .unwrap();

    assert!(decoded.samples.is_empty());
    assert_eq!(decoded.unresolved.len(), 1);
    assert_eq!(decoded.unresolved[0].address, DaqAddress::new(FEB, 3));
    assert_eq!(decoded.unresolved[0].reason, UnresolvedReason::UnknownAddress);
    assert_eq!(decoded.unresolved[0].occurrences, 1);
    assert_eq!(
        reader
            .hit_builder()
            .unresolved_count(&DaqAddress::new(FEB, 3), UnresolvedReason::UnknownAddress),
        1
    );
}

#[test]
fn apv_out_of_range_on_mapped_hybrid_is_reported_as_such() {
    let layout = EraLayout::ENGINEERING_RUN;
    let bad_apv = encode::engineering_multisample(
        MultisampleKind::Data,
        encode::feb_tail_word(FEB, 0, 6, 10, false),
        encode::pack_samples(&[5; 6]),
    );
    let words = encode::forward_buffer(
        &layout,
        encode::frame_header(0, 9),
        &[bad_apv],
        encode::frame_tail(1, 0, false, false),
    );
    let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
    let map = map(Era::EngineeringRun);
    assert!(map.resolve(&DaqAddress::new(FEB, 0)).is_some());

    let decoded = reader.process_event(&engineering_event(words), &map).unwrap();
    assert!(decoded.samples.is_empty());
    assert_eq!(decoded.unresolved.len(), 1);
    assert_eq!(decoded.unresolved[0].address, DaqAddress::new(FEB, 0));
    assert_eq!(decoded.unresolved[0].reason, UnresolvedReason::ChannelOutOfRange);
    assert_eq!(
        reader
            .hit_builder()
            .unresolved_count(&DaqAddress::new(FEB, 0), UnresolvedReason::UnknownAddress),
        0
    );
}

#[test]
fn sync_error_on_later_board_survives_earlier_skip_count() {
    let layout = EraLayout::ENGINEERING_RUN;
    let skip_board = encode::forward_buffer(
        &layout,
        encode::frame_header(0, 9),
        &[data(0, 1, 10)],
        encode::frame_tail(1, 3, false, false),
    );
    let sync_board = encode::forward_buffer(
        &layout,
        encode::frame_header(0, 9),
        &[data(1, 2, 10)],
        encode::frame_tail(1, 0, true, false),
    );
    let event = Bank::container(
        0,
        9,
        vec![Bank::container(
            51,
            0,
            vec![Bank::data(3, 0, skip_board), Bank::data(3, 0, sync_board)],
        )],
    );

    let reader = SvtReader::new(ReaderSettings::new(Era::EngineeringRun));
    let decoded = reader.process_event(&event, &map(Era::EngineeringRun)).unwrap();
    let kinds: Vec<HeaderErrorKind> = decoded
        .header_status
        .errors
        .iter()
        .map(HeaderError::kind)
        .collect();
    assert_eq!(kinds, vec![HeaderErrorKind::SyncError]);
}

#[test]
fn phys2019_error_bit_reported_with_roc_and_index() {
    let sub_header = |error| {
        encode::phys2019_multisample(
            true,
            encode::feb_tail_word(FEB, 0, 0, 0, error),
            encode::apv_header_payload(&[true; 6], &[0x21; 6], &[4; 6]),
        )
    };
    let data_ms = encode::phys2019_multisample(
        false,
        encode::feb_tail_word(FEB, 0, 1, 7, false),
        encode::pack_samples(&[9; 6]),
    );
    let multisamples = [sub_header(false), data_ms, sub_header(true)];

    let mut words = Vec::new();
    encode::append_phys2019_frame(
        &mut words,
        encode::frame_header(0, 3),
        encode::frame_tail(multisamples.len() as u32, 0, false, false),
        &multisamples,
    );
    let event = Bank::container(0, 3, vec![Bank::container(62, 0, vec![Bank::data(3, 0, words)])]);

    let reader = SvtReader::new(ReaderSettings::new(Era::Phys2019).with_retained_headers(true));
    let decoded = reader.process_event(&event, &map(Era::Phys2019)).unwrap();

    let records = decoded.headers.as_ref().unwrap();
    let header = ApvHeader::decode(&records[0].multisample_headers[1]);
    assert_eq!(header.buffer_addresses, [0x21; 6]);
    assert_eq!(header.frame_counts, [4; 6]);
    assert_eq!(header.error_bit, 1);

    assert_eq!(decoded.header_status.errors.len(), 1);
    match &decoded.header_status.errors[0] {
        HeaderError::MultisampleErrorBit { roc, index, .. } => assert_eq!((*roc, *index), (62, 1)),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(decoded.samples.len(), 1);
}
