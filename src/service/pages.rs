use std::path::PathBuf;
use actix_files::NamedFile;

pub(crate) async fn index() -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open(PathBuf::from("templates/index.html"))?)
}
