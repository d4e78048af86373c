use std::path::PathBuf;
use actix_files::NamedFile;
use actix_web::HttpRequest;

// 静态资源，不允许跳出resources目录
pub(crate) async fn resources(req: HttpRequest) -> actix_web::Result<NamedFile> {
    let filename: PathBuf = req.match_info().query("filename").parse()?;
    if filename.components().any(|part| !matches!(part, std::path::Component::Normal(_))) {
        return Err(actix_web::error::ErrorNotFound("resource not found"));
    }
    let mut path: PathBuf = PathBuf::from("resources/");
    path.push(filename);
    Ok(NamedFile::open(path)?)
}
