use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Concatenates the pages of `inputs`, in order, into a single PDF at `out`.
///
/// Returns the number of pages written. Outlines of the inputs are dropped.
pub fn concat_pdfs(inputs: &[PathBuf], out: &Path) -> anyhow::Result<usize> {
    if inputs.is_empty() {
        anyhow::bail!("no input documents");
    }

    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for path in inputs {
        let mut doc =
            Document::load(path).with_context(|| format!("load pdf: {}", path.display()))?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        for page_id in doc.get_pages().into_values() {
            let page = doc
                .get_object(page_id)
                .with_context(|| format!("read page object {page_id:?}: {}", path.display()))?
                .to_owned();
            pages.push((page_id, page));
        }
        objects.extend(doc.objects);
    }
    if pages.is_empty() {
        anyhow::bail!("input documents contain no pages");
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut page_tree: Option<(ObjectId, Dictionary)> = None;

    for (id, object) in objects {
        match type_name(&object).as_deref() {
            Some("Catalog") => {
                if catalog.is_none() {
                    catalog = Some((id, object.as_dict()?.clone()));
                }
            }
            Some("Pages") => {
                let mut dict = object.as_dict()?.clone();
                let root_id = match page_tree.take() {
                    Some((root_id, previous)) => {
                        dict.extend(&previous);
                        root_id
                    }
                    None => id,
                };
                page_tree = Some((root_id, dict));
            }
            Some("Page") | Some("Outlines") | Some("Outline") => {}
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let (catalog_id, mut catalog) = catalog.context("input documents have no catalog")?;
    let (tree_id, mut tree) = page_tree.context("input documents have no page tree")?;

    for (page_id, page) in &pages {
        let mut dict = page.as_dict()?.clone();
        dict.set("Parent", Object::Reference(tree_id));
        merged.objects.insert(*page_id, Object::Dictionary(dict));
    }

    tree.set("Count", Object::Integer(pages.len() as i64));
    tree.set(
        "Kids",
        Object::Array(pages.iter().map(|(id, _)| Object::Reference(*id)).collect()),
    );
    merged.objects.insert(tree_id, Object::Dictionary(tree));

    catalog.set("Pages", Object::Reference(tree_id));
    catalog.remove(b"Outlines");
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged.trailer.set("Root", Object::Reference(catalog_id));

    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.adjust_zero_pages();
    merged.compress();

    save_replacing(&mut merged, out)?;
    Ok(pages.len())
}

/// Saves next to `out` and renames; the temp file never outlives a failure.
fn save_replacing(doc: &mut Document, out: &Path) -> anyhow::Result<()> {
    let tmp_path = out.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let result = doc
        .save(&tmp_path)
        .map(|_| ())
        .with_context(|| format!("write pdf: {}", tmp_path.display()))
        .and_then(|()| {
            std::fs::rename(&tmp_path, out)
                .with_context(|| format!("rename tmp to final: {}", out.display()))
        });
    if result.is_err() {
        match std::fs::remove_file(&tmp_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(path = %tmp_path.display(), ?err, "remove temp pdf failed"),
        }
    }
    result
}

fn type_name(object: &Object) -> Option<String> {
    let dict = object.as_dict().ok()?;
    let name = dict.get(b"Type").ok()?.as_name().ok()?;
    Some(String::from_utf8_lossy(name).into_owned())
}
