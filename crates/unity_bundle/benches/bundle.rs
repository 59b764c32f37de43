use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

pub mod read {
    use divan::Bencher;
    use std::io::{prelude::*, Cursor};
    use unity_bundle::{
        write::{BundleWriter, BundleWriterOptions},
        BundleArchive, CompressionMethod,
    };

    fn get_input() -> Vec<u8> {
        let mut writer = BundleWriter::new(
            Cursor::new(Vec::new()),
            BundleWriterOptions::builder()
                .block_compression(CompressionMethod::Lz4)
                .directory_compression(CompressionMethod::Lz4)
                .build(),
        );
        for i in 0..16 {
            writer.start_file(format!("CAB-{i:04}"), 4).unwrap();
            for j in 0..4096u32 {
                writer.write_all(&(i * j).to_le_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[divan::bench]
    fn open(bencher: Bencher) {
        bencher.with_inputs(get_input).bench_refs(|data| {
            divan::black_box(BundleArchive::from_bytes(data).unwrap());
        });
    }

    #[divan::bench]
    fn access_file(bencher: Bencher) {
        bencher
            .with_inputs(|| BundleArchive::from_bytes(&get_input()).unwrap())
            .bench_refs(|bundle| {
                divan::black_box(bundle.by_index(0).unwrap());
            });
    }

    #[divan::bench(sample_count = 1)]
    fn read_file_all(bencher: Bencher) {
        let bundle = BundleArchive::from_bytes(&get_input()).unwrap();

        bencher.bench_local(move || {
            let mut buffer = Vec::new();
            for i in 0..bundle.len() {
                let mut file = bundle.by_index(i).unwrap();
                file.read_to_end(&mut buffer).unwrap();
                buffer.clear();
            }
        });
    }
}
