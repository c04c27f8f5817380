use divan::{black_box, AllocProfiler, Bencher};
use uab_serialized::{
    ObjectInfo, SerializedFile, SerializedType, TypeTree, TypeTreeNode, WriteOptions,
};

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

/// A file with a few thousand small objects spread over two types
fn build_input() -> (SerializedFile, Vec<Vec<u8>>) {
    let mut file = SerializedFile::default();
    let mut texture = SerializedType::new(28);
    texture.tree = Some(TypeTree::new(vec![
        TypeTreeNode::new(0, "Texture2D", "Base", -1),
        TypeTreeNode::new(1, "string", "m_Name", -1),
        TypeTreeNode::new(1, "int", "m_Width", 4),
        TypeTreeNode::new(1, "int", "m_Height", 4),
    ]));
    file.types = vec![SerializedType::new(1), texture];
    file.objects = (0..4096)
        .map(|index| ObjectInfo {
            path_id: index + 1,
            type_index: (index % 2) as usize,
            ..Default::default()
        })
        .collect();
    let payloads = (0..4096).map(|index| vec![index as u8; 48]).collect();
    (file, payloads)
}

pub mod read {
    use super::*;

    #[divan::bench]
    fn metadata(bencher: Bencher) {
        let (file, payloads) = build_input();
        let mut bytes: Vec<u8> = Vec::new();
        file.write(&payloads, &mut bytes, &WriteOptions::default()).unwrap();

        bencher.bench(|| black_box(SerializedFile::from_bytes(black_box(&bytes)).unwrap()));
    }
}

pub mod write {
    use super::*;

    #[divan::bench]
    fn whole_file(bencher: Bencher) {
        let (file, payloads) = build_input();

        bencher.bench(|| {
            let mut bytes: Vec<u8> = Vec::new();
            black_box(file.write(&payloads, &mut bytes, &WriteOptions::default()).unwrap())
        });
    }
}
