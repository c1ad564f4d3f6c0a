//! Demo data: one photographer, two clients and three albums with
//! placeholder photos. Running it twice is a no-op.

use crate::{
    models::{
        album::NewAlbum,
        client::NewClient,
        photo::{NewPhoto, is_preview_slot},
        photographer::NewPhotographer,
    },
    repository::{AlbumRepository, ClientRepository, PhotographerRepository},
    services::catalog::{AlbumChanges, CatalogError, CatalogService},
};
use tracing::info;

struct DemoAlbum {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    password: &'static str,
    preview_count: i64,
    price: f64,
    is_paid: bool,
    client: usize,
    photo_prefix: &'static str,
    photos: i64,
}

const DEMO_ALBUMS: [DemoAlbum; 3] = [
    DemoAlbum {
        code: "DEMO2024",
        title: "Casamento João & Maria",
        description: "Álbum do casamento realizado em 15 de janeiro de 2024",
        password: "123456",
        preview_count: 5,
        price: 299.99,
        is_paid: true,
        client: 0,
        photo_prefix: "casamento",
        photos: 6,
    },
    DemoAlbum {
        code: "FAMILY2024",
        title: "Ensaio Família Costa",
        description: "Ensaio familiar realizado em estúdio",
        password: "familia123",
        preview_count: 3,
        price: 199.99,
        is_paid: false,
        client: 1,
        photo_prefix: "familia",
        photos: 4,
    },
    DemoAlbum {
        code: "WEDDING2024",
        title: "Casamento Carlos & Lucia",
        description: "Cerimônia e festa de casamento",
        password: "casamento2024",
        preview_count: 8,
        price: 399.99,
        is_paid: true,
        client: 0,
        photo_prefix: "wedding",
        photos: 0,
    },
];

/// Insert the demo dataset unless its first album already exists.
/// Returns whether anything was written.
pub async fn seed_demo<R>(catalog: &CatalogService<R>) -> Result<bool, CatalogError>
where
    R: AlbumRepository + ClientRepository + PhotographerRepository,
{
    if catalog.repo().find_by_code(DEMO_ALBUMS[0].code).await?.is_some() {
        info!("Demo data already present, skipping seed");
        return Ok(false);
    }

    let photographer = catalog
        .create_photographer(NewPhotographer {
            name: "João Fotógrafo".into(),
            email: "fotografo@demo.com".into(),
            phone: Some("(11) 99999-9999".into()),
            studio: Some("Estúdio Demo".into()),
        })
        .await?;

    let mut clients = Vec::new();
    for (name, email, phone) in [
        ("João Silva", "joao.silva@email.com", "(11) 98888-8888"),
        ("Ana Costa", "ana.costa@email.com", "(11) 97777-7777"),
    ] {
        let client = catalog
            .create_client(NewClient {
                name: name.into(),
                email: email.into(),
                phone: Some(phone.into()),
                photographer_id: photographer.id,
            })
            .await?;
        clients.push(client);
    }

    for demo in &DEMO_ALBUMS {
        let client = &clients[demo.client];
        let album = catalog
            .create_album(NewAlbum {
                code: demo.code.into(),
                title: demo.title.into(),
                description: Some(demo.description.into()),
                password: demo.password.into(),
                preview_count: demo.preview_count,
                price: demo.price,
                client_id: client.id,
                photographer_id: photographer.id,
            })
            .await?
            .album;

        for sort_order in 1..=demo.photos {
            let filename = format!("{}_{:03}.jpg", demo.photo_prefix, sort_order);
            catalog
                .repo()
                .insert_photo(&NewPhoto {
                    album_id: album.id,
                    locator: format!("/api/placeholder/800/600?text={}", filename),
                    thumbnail_locator: Some(format!("/api/placeholder/300/300?text={}", filename)),
                    cdn_id: Some(format!("placeholder_{}", filename)),
                    width: Some(800),
                    height: Some(600),
                    size_bytes: 1024 * 1024,
                    format: "jpg".into(),
                    checksum: None,
                    is_preview: is_preview_slot(sort_order, album.preview_count),
                    sort_order,
                    filename,
                })
                .await?;
        }

        if demo.is_paid {
            catalog
                .update_album(
                    album.id,
                    AlbumChanges {
                        is_paid: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
        }
        info!("Seeded album {} ({} photos)", album.code, demo.photos);
    }

    Ok(true)
}
