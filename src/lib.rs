//! # signage-shell : Contrôleur de session pour borne d'affichage
//!
//! Hôte sans surveillance pour du contenu web embarqué, construit sur le
//! moteur Servo. Une seule surface plein écran, sans chrome, qui ne quitte
//! pas tant que le lancement ne l'autorise pas.
//!
//! ## Architecture des modules
//!
//! Cœur pur, testable sans moteur ni fenêtre :
//!
//! - [`session`] : Flags de lancement, détection de plateforme, et
//!   [`SessionConfig`](session::SessionConfig) figée au démarrage.
//! - [`display`] : Cycle de vie de la surface (créée, montrée, détruite).
//! - [`navigation`] : Garde de navigation (même origine que le contenu).
//! - [`lifecycle`] : Politique de quit, confinement des fautes, sortie du
//!   processus de contenu.
//! - [`bridge`] : Capacités exposées au contenu et leur format JSON.
//! - [`controller`] : `(état, événement) → effets`, plus la file FIFO.
//!
//! Liaison avec l'hôte :
//!
//! - [`browser`] : Boucle d'événements Winit ("Two-Phase App") et exécution
//!   des effets.
//! - [`servo_glue`] : `Waker` et delegates Servo → événements.
//! - [`keyutils`] : Raccourcis clavier de l'hôte et conversion Winit → Servo
//!   pour les autres touches.
//! - [`rendering`] : Contexte GPU et fond uni avant que le contenu soit prêt.
//! - [`config`], [`preferences`], [`platform`], [`resources`] : Configuration
//!   TOML, préférences moteur, réglages plateforme, ressources Servo.

pub mod bridge;
pub mod browser;
pub mod config;
pub mod controller;
pub mod display;
pub mod keyutils;
pub mod lifecycle;
pub mod navigation;
pub mod platform;
pub mod preferences;
pub mod rendering;
pub mod resources;
pub mod servo_glue;
pub mod session;
