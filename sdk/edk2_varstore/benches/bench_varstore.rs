use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use edk2_varstore::{BootEntry, Variable, VariableStore, boot::LOAD_OPTION_ACTIVE, variable, volume};
use efi_device_path::DevicePath;
use efi_guid::{EFI_GLOBAL_VARIABLE, KnownGuids};

const VOLUME_SIZE: usize = 0x40000;

fn populated_image(count: u16) -> Vec<u8> {
    let image = volume::format_volume(VOLUME_SIZE, &KnownGuids::standard()).unwrap();
    let mut store = VariableStore::from_image(image).unwrap();
    for id in 0..count {
        let entry = BootEntry::new(
            LOAD_OPTION_ACTIVE,
            format!("HTTP boot {id}"),
            DevicePath::uri(&format!("http://10.0.50.1/boot/{id}.efi")),
            Vec::new(),
        );
        store.set_boot_entry(id, &entry).unwrap();
    }
    store.set_boot_order(&(0..count).collect::<Vec<_>>());
    store.serialize_image().unwrap()
}

pub fn benchmark_store_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    for count in [16u16, 256] {
        let image = populated_image(count);

        group.bench_with_input(BenchmarkId::new("from_image", count), &image, |b, image| {
            b.iter(|| VariableStore::from_image(image.clone()).unwrap())
        });

        let store = VariableStore::from_image(image).unwrap();
        group.bench_with_input(BenchmarkId::new("serialize_image", count), &store, |b, store| {
            b.iter(|| store.serialize_image().unwrap())
        });
        group.bench_with_input(BenchmarkId::new("ordered_boot_entries", count), &store, |b, store| {
            b.iter(|| store.ordered_boot_entries().unwrap())
        });
    }
    group.finish();
}

pub fn benchmark_record_functions(c: &mut Criterion) {
    let variables: Vec<Variable> = (0..256)
        .map(|i| Variable::new(format!("Var{i:04}"), EFI_GLOBAL_VARIABLE, 7, vec![0xA5; 64]))
        .collect();
    let region = variable::encode_records(&variables).unwrap();

    c.bench_function("encode_records", |b| b.iter(|| variable::encode_records(&variables).unwrap()));
    c.bench_function("decode_records", |b| b.iter(|| variable::decode_records(&region)));
}

criterion_group!(benches, benchmark_store_functions, benchmark_record_functions);
criterion_main!(benches);
